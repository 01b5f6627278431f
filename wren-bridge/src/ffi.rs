//! C ABI mirrors of the embedded VM's public header.
//!
//! Only the shapes are declared here. The entry points themselves are
//! resolved at run time by [`crate::native::NativeApi`].
#![allow(non_snake_case, non_camel_case_types)]

use core::ffi::{c_char, c_int, c_void};

#[repr(C)]
pub struct WrenVM {
    _private: [u8; 0],
}

#[repr(C)]
pub struct WrenHandle {
    _private: [u8; 0],
}

pub type WrenReallocateFn =
    unsafe extern "C" fn(memory: *mut c_void, new_size: usize, user_data: *mut c_void) -> *mut c_void;

/// Foreign methods and allocators. `user_data` is echoed back unchanged.
pub type WrenForeignMethodFn = unsafe extern "C" fn(vm: *mut WrenVM, user_data: *mut c_void);

/// `data` is the foreign instance storage, `user_data` the finalizer's token.
pub type WrenFinalizerFn =
    unsafe extern "C" fn(vm: *mut WrenVM, data: *mut c_void, user_data: *mut c_void);

pub type WrenResolveModuleFn = unsafe extern "C" fn(
    vm: *mut WrenVM,
    importer: *const c_char,
    name: *const c_char,
) -> *const c_char;

pub type WrenLoadModuleCompleteFn =
    unsafe extern "C" fn(vm: *mut WrenVM, name: *const c_char, result: WrenLoadModuleResult);

pub type WrenLoadModuleFn =
    unsafe extern "C" fn(vm: *mut WrenVM, name: *const c_char) -> WrenLoadModuleResult;

pub type WrenBindForeignMethodFn = unsafe extern "C" fn(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
    is_static: bool,
    signature: *const c_char,
) -> WrenBindForeignMethodResult;

pub type WrenBindForeignClassFn = unsafe extern "C" fn(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
) -> WrenForeignClassMethods;

pub type WrenWriteFn = unsafe extern "C" fn(vm: *mut WrenVM, text: *const c_char);

pub type WrenErrorFn = unsafe extern "C" fn(
    vm: *mut WrenVM,
    error_type: c_int,
    module: *const c_char,
    line: c_int,
    message: *const c_char,
);

#[repr(C)]
#[derive(Clone, Copy)]
pub struct WrenLoadModuleResult {
    pub source: *const c_char,
    pub onComplete: Option<WrenLoadModuleCompleteFn>,
    pub userData: *mut c_void,
}

impl WrenLoadModuleResult {
    pub fn none() -> Self {
        Self {
            source: core::ptr::null(),
            onComplete: None,
            userData: core::ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct WrenBindForeignMethodResult {
    pub executeFn: Option<WrenForeignMethodFn>,
    pub userData: *mut c_void,
}

impl WrenBindForeignMethodResult {
    pub fn none() -> Self {
        Self {
            executeFn: None,
            userData: core::ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct WrenForeignClassMethods {
    pub allocate: Option<WrenForeignMethodFn>,
    pub finalize: Option<WrenFinalizerFn>,
    pub allocateUserData: *mut c_void,
    pub finalizeUserData: *mut c_void,
}

impl WrenForeignClassMethods {
    pub fn none() -> Self {
        Self {
            allocate: None,
            finalize: None,
            allocateUserData: core::ptr::null_mut(),
            finalizeUserData: core::ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct WrenConfiguration {
    pub reallocateFn: Option<WrenReallocateFn>,
    pub resolveModuleFn: Option<WrenResolveModuleFn>,
    pub loadModuleFn: Option<WrenLoadModuleFn>,
    pub bindForeignMethodFn: Option<WrenBindForeignMethodFn>,
    pub bindForeignClassFn: Option<WrenBindForeignClassFn>,
    pub writeFn: Option<WrenWriteFn>,
    pub errorFn: Option<WrenErrorFn>,
    pub initialHeapSize: usize,
    pub minHeapSize: usize,
    pub heapGrowthPercent: c_int,
    pub userData: *mut c_void,
}

impl WrenConfiguration {
    /// All hooks unset, sizes zeroed. Always passed through
    /// `wrenInitConfiguration` before use so the native defaults apply.
    pub fn zeroed() -> Self {
        Self {
            reallocateFn: None,
            resolveModuleFn: None,
            loadModuleFn: None,
            bindForeignMethodFn: None,
            bindForeignClassFn: None,
            writeFn: None,
            errorFn: None,
            initialHeapSize: 0,
            minHeapSize: 0,
            heapGrowthPercent: 0,
            userData: core::ptr::null_mut(),
        }
    }
}

pub const WREN_RESULT_SUCCESS: c_int = 0;
pub const WREN_RESULT_COMPILE_ERROR: c_int = 1;
pub const WREN_RESULT_RUNTIME_ERROR: c_int = 2;

pub const WREN_ERROR_COMPILE: c_int = 0;
pub const WREN_ERROR_RUNTIME: c_int = 1;
pub const WREN_ERROR_STACK_TRACE: c_int = 2;

pub const WREN_TYPE_BOOL: c_int = 0;
pub const WREN_TYPE_NUM: c_int = 1;
pub const WREN_TYPE_FOREIGN: c_int = 2;
pub const WREN_TYPE_LIST: c_int = 3;
pub const WREN_TYPE_MAP: c_int = 4;
pub const WREN_TYPE_NULL: c_int = 5;
pub const WREN_TYPE_STRING: c_int = 6;
pub const WREN_TYPE_UNKNOWN: c_int = 7;
