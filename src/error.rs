//! Error types for the arithmetic codec and its models.

use thiserror::Error;

/// Broad classification of every failure the codec can report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// a size, probability or alphabet outside its legal range
    Configuration,
    /// an operation issued in the wrong session state
    State,
    /// the code buffer is too small for the produced stream
    Overflow,
    /// reading or writing a framed stream failed
    Io,
}

/// Error variants for codec and model operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(&'static str),

    #[error("state error: {0}")]
    State(&'static str),

    #[error("overflow error: {0}")]
    Overflow(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::State(_) => ErrorKind::State,
            Error::Overflow(_) => ErrorKind::Overflow,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn kind_matches_variant() {
    assert_eq!(
        Error::Configuration("x").kind(),
        ErrorKind::Configuration
    );
    assert_eq!(Error::State("x").kind(), ErrorKind::State);
    assert_eq!(Error::Overflow("x").kind(), ErrorKind::Overflow);

    let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
    assert_eq!(Error::from(io).kind(), ErrorKind::Io);
}
