use thiserror::Error;

use crate::Tag;

/// Fatal problems with the bytes or tokens being decoded.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("expected tag `{expected}`, found `{found}`")]
    TagMismatch { expected: Tag, found: Tag },

    #[error("unexpected tag `{found}` in {block}")]
    UnexpectedTag { found: Tag, block: &'static str },

    #[error("unknown token `{token}` in {block} (line {line})")]
    UnknownToken {
        token: String,
        block: &'static str,
        line: usize,
    },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("invalid number `{token}` (line {line})")]
    InvalidNumber { token: String, line: usize },

    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Integrity problems raised by timeline mutation or evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("a keyframe already exists at time {time}")]
    DuplicateKeyframe { time: i32 },

    #[error("no keyframe at time {time}")]
    KeyframeNotFound { time: i32 },

    #[error("invalid interpolation state: {reason}")]
    InvalidInterpolationState { reason: String },
}

impl StateError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        StateError::InvalidInterpolationState {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize: {0}")]
    Serialize(String),
}

impl From<cookie_factory::GenError> for Error {
    fn from(err: cookie_factory::GenError) -> Self {
        match err {
            cookie_factory::GenError::IoError(e) => Error::Io(e),
            e => Error::Serialize(format!("{:?}", e)),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
