use std::path::PathBuf;

use thiserror::Error;

use crate::{CallbackKey, ValueType};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load native VM library `{}`: {source}", .path.display())]
    Library {
        path: PathBuf,
        source: libloading::Error,
    },

    #[error("native VM library is missing `{name}`: {source}")]
    MissingSymbol {
        name: &'static str,
        source: libloading::Error,
    },

    #[error("text passed to the VM contains an interior NUL byte")]
    InteriorNul(#[from] std::ffi::NulError),

    #[error("slot {slot} is out of range ({count} slots available)")]
    SlotOutOfRange { slot: usize, count: usize },

    #[error("slot {slot} holds {found}, expected {expected}")]
    SlotType {
        slot: usize,
        expected: ValueType,
        found: ValueType,
    },

    #[error("index {index} is out of range for a list of {count} elements")]
    ListIndex { index: isize, count: usize },

    #[error("no host object is attached to foreign instance {0:#x}")]
    ForeignNotAttached(usize),

    #[error("foreign instance {0:#x} already has a host object attached")]
    ForeignAlreadyAttached(usize),

    #[error("foreign object in slot {slot} is not a `{expected}`")]
    ForeignType { slot: usize, expected: &'static str },

    #[error("callback key {0} is not registered")]
    UnknownCallback(CallbackKey),

    #[error("module source {0:#x} was not issued by this VM")]
    UnknownSource(usize),

    #[error("handle belongs to a different VM")]
    ForeignHandle,

    #[error("handle outlived the VM that issued it")]
    StaleHandle,

    #[error("module `{module}` has no variable `{name}`")]
    UnknownVariable { module: String, name: String },

    #[error("native VM ran out of memory")]
    VMAllocation,

    #[error("native layer invoked a callback without its key")]
    MissingCallbackKey,

    #[error("{0}")]
    Message(String),
}

impl Error {
    /// A free-form failure, typically used by foreign methods to abort the
    /// calling fiber with `message`.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Self::Message(value.to_owned())
    }
}
