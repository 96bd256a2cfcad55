use fastac::{
    AdaptiveBitModel, AdaptiveDataModel, ArithmeticCodec, DataModel, StaticBitModel,
    StaticDataModel,
};
use proptest::prelude::*;

fn alphabet_and_data() -> impl Strategy<Value = (u32, Vec<u32>)> {
    (2u32..=2048).prop_flat_map(|n| (Just(n), prop::collection::vec(0..n, 1..400)))
}

fn weights_and_data() -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    prop::collection::vec(1u32..100, 2..64).prop_flat_map(|weights| {
        let n = weights.len() as u32;
        (Just(weights), prop::collection::vec(0..n, 1..400))
    })
}

proptest! {
    #[test]
    fn adaptive_symbols_roundtrip((n, input) in alphabet_and_data()) {
        let mut codec = ArithmeticCodec::with_capacity(16 + input.len() * 3).unwrap();
        let mut model = AdaptiveDataModel::new(n).unwrap();

        codec.start_encoder().unwrap();
        for &s in &input {
            codec.encode_symbol(s, &mut model).unwrap();
        }
        let code_bytes = codec.stop_encoder().unwrap();
        prop_assert!(code_bytes <= codec.buffer_size());

        model.reset();
        codec.start_decoder().unwrap();
        let output: Vec<u32> = input
            .iter()
            .map(|_| codec.decode_symbol(&mut model).unwrap())
            .collect();
        codec.stop_decoder().unwrap();

        prop_assert_eq!(input, output);
    }

    #[test]
    fn static_symbols_roundtrip((weights, input) in weights_and_data()) {
        let total: u32 = weights.iter().sum();
        let probabilities: Vec<f64> = weights
            .iter()
            .map(|&w| f64::from(w) / f64::from(total))
            .collect();

        let mut model =
            StaticDataModel::new(weights.len() as u32, Some(&probabilities[..])).unwrap();
        let mut codec = ArithmeticCodec::with_capacity(16 + input.len() * 3).unwrap();

        codec.start_encoder().unwrap();
        for &s in &input {
            codec.encode_symbol(s, &mut model).unwrap();
        }
        let _ = codec.stop_encoder().unwrap();

        codec.start_decoder().unwrap();
        for &s in &input {
            prop_assert_eq!(s, codec.decode_symbol(&mut model).unwrap());
        }
        codec.stop_decoder().unwrap();
    }

    #[test]
    fn bits_roundtrip(
        input in prop::collection::vec((any::<bool>(), 1u32..=20, any::<u32>()), 1..300),
        p0 in 0.0001f64..0.9999,
    ) {
        let mut static_model = StaticBitModel::new();
        static_model.set_probability_0(p0).unwrap();
        let mut adaptive_model = AdaptiveBitModel::new();

        let mut codec = ArithmeticCodec::with_capacity(16 + input.len() * 8).unwrap();

        codec.start_encoder().unwrap();
        for &(bit, width, raw) in &input {
            codec.encode_bit(bit, &mut static_model).unwrap();
            codec.encode_bit(!bit, &mut adaptive_model).unwrap();
            codec.put_bit(bit).unwrap();
            codec.put_bits(raw & ((1 << width) - 1), width).unwrap();
        }
        let _ = codec.stop_encoder().unwrap();

        adaptive_model.reset();
        codec.start_decoder().unwrap();
        for &(bit, width, raw) in &input {
            prop_assert_eq!(bit, codec.decode_bit(&mut static_model).unwrap());
            prop_assert_eq!(!bit, codec.decode_bit(&mut adaptive_model).unwrap());
            prop_assert_eq!(bit, codec.get_bit().unwrap());
            prop_assert_eq!(raw & ((1 << width) - 1), codec.get_bits(width).unwrap());
        }
        codec.stop_decoder().unwrap();
    }

    #[test]
    fn decoder_table_agrees_with_bisection(
        (n, input) in alphabet_and_data(),
        dv in 0u32..0x8000,
    ) {
        let mut model = AdaptiveDataModel::new(n).unwrap();
        for &s in &input {
            model.record(s, false);
        }

        let distribution = model.distribution();
        prop_assert_eq!(distribution.find_symbol(dv), distribution.bisect(dv));
    }
}
