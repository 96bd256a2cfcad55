#![forbid(unsafe_code)]
#![forbid(trivial_numeric_casts)]
#![deny(unused_qualifications)]
#![deny(unused_results)]
#![forbid(unreachable_pub)]
#![forbid(deprecated_in_future)]

pub mod bit_model;
pub mod codec;
pub mod data_model;
pub mod error;
pub mod framing;
mod traits;

pub use bit_model::{AdaptiveBitModel, StaticBitModel};
pub use codec::{ArithmeticCodec, Mode};
pub use data_model::{AdaptiveDataModel, Distribution, StaticDataModel};
pub use error::{Error, ErrorKind, Result};
pub use traits::{BitModel, DataModel};
