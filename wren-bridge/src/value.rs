use core::ffi::c_int;
use std::fmt;

use crate::ffi;

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 4;
pub const VERSION_PATCH: u32 = 0;
pub const VERSION_STRING: &str = "0.4.0";
pub const VERSION_NUMBER: u32 = VERSION_MAJOR * 1_000_000 + VERSION_MINOR * 1_000 + VERSION_PATCH;

/// `[major, minor, patch]` of the VM release these bindings target.
pub const fn version_tuple() -> [u32; 3] {
    [VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpretResult {
    Success,
    CompileError,
    RuntimeError,
}

impl InterpretResult {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            ffi::WREN_RESULT_SUCCESS => Self::Success,
            ffi::WREN_RESULT_COMPILE_ERROR => Self::CompileError,
            _ => Self::RuntimeError,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Num,
    Foreign,
    List,
    Map,
    Null,
    String,
    Unknown,
}

impl ValueType {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            ffi::WREN_TYPE_BOOL => Self::Bool,
            ffi::WREN_TYPE_NUM => Self::Num,
            ffi::WREN_TYPE_FOREIGN => Self::Foreign,
            ffi::WREN_TYPE_LIST => Self::List,
            ffi::WREN_TYPE_MAP => Self::Map,
            ffi::WREN_TYPE_NULL => Self::Null,
            ffi::WREN_TYPE_STRING => Self::String,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "Bool",
            Self::Num => "Num",
            Self::Foreign => "a foreign object",
            Self::List => "List",
            Self::Map => "Map",
            Self::Null => "null",
            Self::String => "String",
            Self::Unknown => "an unknown value",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Compile error in `module` at `line`.
    Compile,
    /// Runtime error; the stack trace follows as `StackTrace` reports.
    Runtime,
    /// One stack frame: `message` is the function name.
    StackTrace,
}

impl ErrorKind {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            ffi::WREN_ERROR_COMPILE => Self::Compile,
            ffi::WREN_ERROR_RUNTIME => Self::Runtime,
            _ => Self::StackTrace,
        }
    }
}

/// One report delivered to the error hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub module: String,
    pub line: i32,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Compile => write!(f, "[{} line {}] [Error] {}", self.module, self.line, self.message),
            ErrorKind::Runtime => write!(f, "[Runtime Error] {}", self.message),
            ErrorKind::StackTrace => write!(f, "[{} line {}] in {}", self.module, self.line, self.message),
        }
    }
}
