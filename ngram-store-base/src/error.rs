// We want a few things here:
// 1. Distinct error kinds a caller can match on, because the query layer
//    recovers locally from one kind (`NotFound`) and propagates the rest.
// 2. A centralized place to log an error when it's created, close to its
//    source, rather than only at the point it's finally reported.

use std::borrow::Cow;

use tracing::{debug, warn};

#[cfg(test)]
use test_log::test;

// NotFound is routine (absent prefix/context) and should never escape
// NGramStorage; the others are fatal to a build or load.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(Cow<'static, str>),

    #[error("corrupt stream: {0}")]
    CorruptStream(Cow<'static, str>),

    #[error("vocabulary index out of range: {0}")]
    VocabMismatch(Cow<'static, str>),

    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Error {
        let err = Error::NotFound(msg.into());
        debug!(target: "ngram_store", "{err}");
        err
    }

    pub fn corrupt_stream(msg: impl Into<Cow<'static, str>>) -> Error {
        let err = Error::CorruptStream(msg.into());
        warn!(target: "ngram_store", "{err}");
        err
    }

    pub fn vocab_mismatch(msg: impl Into<Cow<'static, str>>) -> Error {
        let err = Error::VocabMismatch(msg.into());
        warn!(target: "ngram_store", "{err}");
        err
    }

    pub fn invalid_input(msg: impl Into<Cow<'static, str>>) -> Error {
        let err = Error::InvalidInput(msg.into());
        warn!(target: "ngram_store", "{err}");
        err
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[test]
fn test_error_display() {
    let err = Error::not_found("context");
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "not found: context");
}
