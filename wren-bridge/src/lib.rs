//! Host bindings for the Wren scripting VM.
//!
//! The native VM is loaded from a shared library at run time. Each VM built
//! with a [`Config`] is registered in a process-wide table so the C callbacks
//! can find their host state, and every foreign method, allocator and
//! finalizer is reached through a [`CallbackKey`] the native side echoes back.

mod config;
mod error;
pub mod ffi;
mod foreign;
mod handles;
mod keys;
mod modules;
pub mod native;
mod trampolines;
mod value;
mod vm;

#[cfg(test)]
mod testing;

pub use config::{
    BindForeignClassFn, BindForeignMethodFn, Config, ErrorFn, FinalizerFn, ForeignClassMethods,
    ForeignMethodFn, LoadModuleFn, MethodSignature, ResolveModuleFn, WriteFn, finalizer,
    foreign_method,
};
pub use error::{Error, Result};
pub use foreign::{ForeignTable, SourceLedger};
pub use handles::{HandleTable, live_vms};
pub use keys::{CallbackKey, CallbackRegistry};
pub use modules::{ModuleLoader, PRIVATE_PREFIX};
pub use native::NativeApi;
pub use value::{
    ErrorKind, ErrorReport, InterpretResult, VERSION_MAJOR, VERSION_MINOR, VERSION_NUMBER,
    VERSION_PATCH, VERSION_STRING, ValueType, version_tuple,
};
pub use vm::{CallHandle, ExitHandle, Handle, OwnedVM, VM};
