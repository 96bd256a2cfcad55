use criterion::{criterion_group, criterion_main, Bencher, Criterion};

use fastac::{
    AdaptiveBitModel, AdaptiveDataModel, ArithmeticCodec, StaticBitModel, StaticDataModel,
};

const fn gen_pattern() -> [bool; 1024] {
    let mut pattern = [false; 1024];
    let mut i = 0;
    while i < 100 {
        pattern[i] = false;
        i += 1;
    }
    while i < 200 {
        pattern[i] = true;
        i += 1;
    }
    while i < 300 {
        pattern[i] = i % 2 == 0;
        i += 1;
    }
    while i < 400 {
        pattern[i] = i % 10 == 0;
        i += 1;
    }
    while i < 500 {
        pattern[i] = i % 30 != 0;
        i += 1;
    }
    while i < 700 {
        pattern[i] = i % 5 != 0;
        i += 1;
    }
    while i < 900 {
        pattern[i] = i % 9 == 0;
        i += 1;
    }
    while i < 1024 {
        pattern[i] = i % 2 == 0;
        i += 1;
    }

    pattern
}

const BOOL_PATTERN: [bool; 1024] = gen_pattern();

fn pattern(i: u32) -> bool {
    BOOL_PATTERN[(i & 1023) as usize]
}

/// skewed towards small values, like residuals
fn symbol(i: u32) -> u32 {
    let x = i.wrapping_mul(0x9E37_79B9) >> 24;
    (x * x) >> 8
}

const ROUNDS: u32 = 16 * 1024;
const BUFFER_SIZE: usize = 64 * 1024;

/// encodes once in the setup and measures decoding the result
fn test_decode(
    b: &mut Bencher,
    init_fn: fn(&mut ArithmeticCodec),
    run_fn: fn(&mut ArithmeticCodec),
) {
    b.iter_batched(
        || {
            let mut codec = ArithmeticCodec::with_capacity(BUFFER_SIZE).unwrap();
            codec.start_encoder().unwrap();

            init_fn(&mut codec);

            let code_bytes = codec.stop_encoder().unwrap();
            codec.buffer()[..code_bytes].to_vec()
        },
        |mut s| {
            s.resize(s.len().max(16), 0);
            let mut codec = ArithmeticCodec::with_user_buffer(&mut s).unwrap();
            codec.start_decoder().unwrap();

            run_fn(&mut codec);

            codec.stop_decoder().unwrap();
        },
        criterion::BatchSize::LargeInput,
    );
}

fn test_encode(b: &mut Bencher, init_fn: fn(&mut ArithmeticCodec)) {
    b.iter_batched(
        || ArithmeticCodec::with_capacity(BUFFER_SIZE).unwrap(),
        |mut codec| {
            codec.start_encoder().unwrap();
            init_fn(&mut codec);
            codec.stop_encoder().unwrap()
        },
        criterion::BatchSize::LargeInput,
    );
}

fn adaptive_bit_init(codec: &mut ArithmeticCodec) {
    let mut model = AdaptiveBitModel::new();
    for i in 0..ROUNDS {
        codec.encode_bit(pattern(i), &mut model).unwrap();
    }
}

fn adaptive_bit_run(codec: &mut ArithmeticCodec) {
    let mut model = AdaptiveBitModel::new();
    for i in 0..ROUNDS {
        assert_eq!(pattern(i), codec.decode_bit(&mut model).unwrap());
    }
}

fn static_bit_model() -> StaticBitModel {
    let mut model = StaticBitModel::new();
    model.set_probability_0(0.3).unwrap();
    model
}

fn static_bit_init(codec: &mut ArithmeticCodec) {
    let mut model = static_bit_model();
    for i in 0..ROUNDS {
        codec.encode_bit(pattern(i), &mut model).unwrap();
    }
}

fn static_bit_run(codec: &mut ArithmeticCodec) {
    let mut model = static_bit_model();
    for i in 0..ROUNDS {
        assert_eq!(pattern(i), codec.decode_bit(&mut model).unwrap());
    }
}

fn raw_bits_init(codec: &mut ArithmeticCodec) {
    for i in 0..ROUNDS {
        codec.put_bit(pattern(i)).unwrap();
    }
}

fn raw_bits_run(codec: &mut ArithmeticCodec) {
    for i in 0..ROUNDS {
        assert_eq!(pattern(i), codec.get_bit().unwrap())
    }
}

fn adaptive_data_init(codec: &mut ArithmeticCodec) {
    let mut model = AdaptiveDataModel::new(256).unwrap();
    for i in 0..ROUNDS {
        codec.encode_symbol(symbol(i), &mut model).unwrap();
    }
}

fn adaptive_data_run(codec: &mut ArithmeticCodec) {
    let mut model = AdaptiveDataModel::new(256).unwrap();
    for i in 0..ROUNDS {
        assert_eq!(symbol(i), codec.decode_symbol(&mut model).unwrap());
    }
}

fn static_data_init(codec: &mut ArithmeticCodec) {
    let mut model = StaticDataModel::new(256, None).unwrap();
    for i in 0..ROUNDS {
        codec.encode_symbol(symbol(i), &mut model).unwrap();
    }
}

fn static_data_run(codec: &mut ArithmeticCodec) {
    let mut model = StaticDataModel::new(256, None).unwrap();
    for i in 0..ROUNDS {
        assert_eq!(symbol(i), codec.decode_symbol(&mut model).unwrap());
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("adaptive bit encode", |b| {
        test_encode(b, adaptive_bit_init);
    });

    c.bench_function("adaptive bit decode", |b| {
        test_decode(b, adaptive_bit_init, adaptive_bit_run);
    });

    c.bench_function("static bit decode", |b| {
        test_decode(b, static_bit_init, static_bit_run);
    });

    c.bench_function("raw bits decode", |b| {
        test_decode(b, raw_bits_init, raw_bits_run);
    });

    c.bench_function("adaptive data encode", |b| {
        test_encode(b, adaptive_data_init);
    });

    c.bench_function("adaptive data decode", |b| {
        test_decode(b, adaptive_data_init, adaptive_data_run);
    });

    c.bench_function("static data decode", |b| {
        test_decode(b, static_data_init, static_data_run);
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
