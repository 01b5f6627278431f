//! C-ABI entry points the native VM calls back into.
//!
//! Each trampoline finds the host [`VM`] for the native pointer through the
//! handle table, converts the C arguments and hands off to a safe function
//! returning [`Result`]. An `Err` there means a bridge invariant broke (an
//! unknown key, a module source returned twice, a double finalize) and the
//! process is aborted. Panics from host closures are contained and never
//! cross the C boundary.

use core::ffi::{c_char, c_int, c_void};
use std::{
    any::Any,
    borrow::Cow,
    ffi::CStr,
    fmt::Display,
    panic::{AssertUnwindSafe, catch_unwind},
};

use crate::{
    CallbackKey, Config, Error, ErrorKind, ErrorReport, MethodSignature, Result, VM,
    ffi::{
        WrenBindForeignClassFn, WrenBindForeignMethodFn, WrenBindForeignMethodResult,
        WrenConfiguration, WrenErrorFn, WrenFinalizerFn, WrenForeignClassMethods,
        WrenForeignMethodFn, WrenLoadModuleCompleteFn, WrenLoadModuleFn, WrenLoadModuleResult,
        WrenResolveModuleFn, WrenVM, WrenWriteFn,
    },
    handles::{VMS, native_id},
};

/// Points every hook `config` sets at its trampoline and copies the heap
/// tuning. Unset hooks and sizes keep the native defaults.
pub(crate) fn wire(config: &Config, native: &mut WrenConfiguration) {
    if config.resolve_module_fn.is_some() {
        native.resolveModuleFn = Some(resolve_module as WrenResolveModuleFn);
    }
    if config.load_module_fn.is_some() {
        native.loadModuleFn = Some(load_module as WrenLoadModuleFn);
    }
    if config.bind_foreign_method_fn.is_some() {
        native.bindForeignMethodFn = Some(bind_foreign_method as WrenBindForeignMethodFn);
    }
    if config.bind_foreign_class_fn.is_some() {
        native.bindForeignClassFn = Some(bind_foreign_class as WrenBindForeignClassFn);
    }
    if config.write_fn.is_some() {
        native.writeFn = Some(write as WrenWriteFn);
    }
    if config.error_fn.is_some() {
        native.errorFn = Some(error as WrenErrorFn);
    }
    if let Some(size) = config.initial_heap_size {
        native.initialHeapSize = size;
    }
    if let Some(size) = config.min_heap_size {
        native.minHeapSize = size;
    }
    if let Some(percent) = config.heap_growth_percent {
        native.heapGrowthPercent = percent;
    }
}

/// Logs and aborts. Used when the bridge's own bookkeeping is inconsistent.
pub(crate) fn fatal(what: impl Display) -> ! {
    log::error!("wren bridge invariant violated: {what}");
    std::process::abort()
}

/// # Safety
///
/// `vm` must be a VM created with a configuration, still registered.
unsafe fn host<'a>(vm: *mut WrenVM) -> &'a VM {
    match VMS.lookup(native_id(vm)) {
        // SAFETY: entries are removed before the host VM is deallocated
        Some(entry) => unsafe { entry.0.as_ref() },
        None => fatal(format_args!("callback from unregistered VM {:#x}", native_id(vm))),
    }
}

/// # Safety
///
/// `ptr` must be null or a NUL-terminated string valid for `'a`.
unsafe fn text<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        // SAFETY: upheld by the caller
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Runs a host hook; a panic is logged and reported as `None`.
fn contain<R>(hook: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            log::warn!("{hook} hook panicked: {}", panic_message(payload.as_ref()));
            None
        }
    }
}

/// Copies `text` into memory the native VM frees with its default allocator.
fn native_string(text: &str) -> Option<*const c_char> {
    if text.as_bytes().contains(&0) {
        log::warn!("resolved module name {text:?} contains a NUL byte");
        return None;
    }
    // SAFETY: plain allocation of len + 1 bytes
    let ptr = unsafe { libc::malloc(text.len() + 1) } as *mut u8;
    if ptr.is_null() {
        fatal("out of memory copying a resolved module name");
    }
    // SAFETY: `ptr` has room for the bytes and the terminator
    unsafe {
        std::ptr::copy_nonoverlapping(text.as_ptr(), ptr, text.len());
        *ptr.add(text.len()) = 0;
    }
    Some(ptr as *const c_char)
}

fn key_from(user_data: *mut c_void) -> Result<CallbackKey> {
    CallbackKey::from_user_data(user_data).ok_or(Error::MissingCallbackKey)
}

pub(crate) fn resolve_module_name(vm: &VM, importer: &str, name: &str) -> Option<String> {
    let hook = vm.config()?.resolve_module_fn.as_ref()?;
    contain("resolve-module", || hook(vm, importer, name)).flatten()
}

unsafe extern "C" fn resolve_module(
    vm: *mut WrenVM,
    importer: *const c_char,
    name: *const c_char,
) -> *const c_char {
    // SAFETY: the native VM passes itself and valid strings
    let (vm, importer, name) = unsafe { (host(vm), text(importer), text(name)) };
    resolve_module_name(vm, &importer, &name)
        .and_then(|resolved| native_string(&resolved))
        .unwrap_or(core::ptr::null())
}

pub(crate) fn load_module_source(vm: &VM, name: &str) -> WrenLoadModuleResult {
    let Some(hook) = vm.config().and_then(|config| config.load_module_fn.as_ref()) else {
        return WrenLoadModuleResult::none();
    };
    let Some(source) = contain("load-module", || hook(vm, name)).flatten() else {
        return WrenLoadModuleResult::none();
    };
    match std::ffi::CString::new(source) {
        Ok(source) => WrenLoadModuleResult {
            source: vm.sources.borrow_mut().issue(source),
            onComplete: Some(load_module_complete as WrenLoadModuleCompleteFn),
            userData: core::ptr::null_mut(),
        },
        Err(_) => {
            log::warn!("source of module `{name}` contains a NUL byte");
            WrenLoadModuleResult::none()
        }
    }
}

unsafe extern "C" fn load_module(vm: *mut WrenVM, name: *const c_char) -> WrenLoadModuleResult {
    // SAFETY: the native VM passes itself and a valid string
    let (vm, name) = unsafe { (host(vm), text(name)) };
    load_module_source(vm, &name)
}

pub(crate) fn complete_load(vm: &VM, source: *const c_char) -> Result<()> {
    if source.is_null() {
        return Ok(());
    }
    vm.sources.borrow_mut().reclaim(source)
}

unsafe extern "C" fn load_module_complete(
    vm: *mut WrenVM,
    _name: *const c_char,
    result: WrenLoadModuleResult,
) {
    // SAFETY: the native VM passes itself
    let vm = unsafe { host(vm) };
    if let Err(err) = complete_load(vm, result.source) {
        fatal(err);
    }
}

pub(crate) fn bind_method(vm: &VM, signature: &MethodSignature<'_>) -> WrenBindForeignMethodResult {
    let Some(hook) = vm.config().and_then(|config| config.bind_foreign_method_fn.as_ref()) else {
        return WrenBindForeignMethodResult::none();
    };
    match contain("bind-foreign-method", || hook(vm, signature)).flatten() {
        Some(method) => {
            let key = vm.callbacks.borrow_mut().bind_method(Some(method));
            WrenBindForeignMethodResult {
                executeFn: Some(execute as WrenForeignMethodFn),
                userData: key.as_user_data(),
            }
        }
        None => WrenBindForeignMethodResult::none(),
    }
}

unsafe extern "C" fn bind_foreign_method(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
    is_static: bool,
    signature: *const c_char,
) -> WrenBindForeignMethodResult {
    // SAFETY: the native VM passes itself and valid strings
    let (vm, module, class_name, signature) =
        unsafe { (host(vm), text(module), text(class_name), text(signature)) };
    let signature = MethodSignature {
        module: &module,
        class_name: &class_name,
        is_static,
        signature: &signature,
    };
    bind_method(vm, &signature)
}

pub(crate) fn bind_class(vm: &VM, module: &str, class_name: &str) -> WrenForeignClassMethods {
    let Some(hook) = vm.config().and_then(|config| config.bind_foreign_class_fn.as_ref()) else {
        return WrenForeignClassMethods::none();
    };
    let Some(methods) = contain("bind-foreign-class", || hook(vm, module, class_name)) else {
        return WrenForeignClassMethods::none();
    };
    if methods.is_empty() {
        return WrenForeignClassMethods::none();
    }

    let mut callbacks = vm.callbacks.borrow_mut();
    let allocate = callbacks.bind_method(methods.allocate);
    let finalize = callbacks.bind_finalizer(methods.finalize);
    WrenForeignClassMethods {
        allocate: Some(execute as WrenForeignMethodFn),
        finalize: Some(finalize_foreign as WrenFinalizerFn),
        allocateUserData: allocate.as_user_data(),
        finalizeUserData: finalize.as_user_data(),
    }
}

unsafe extern "C" fn bind_foreign_class(
    vm: *mut WrenVM,
    module: *const c_char,
    class_name: *const c_char,
) -> WrenForeignClassMethods {
    // SAFETY: the native VM passes itself and valid strings
    let (vm, module, class_name) = unsafe { (host(vm), text(module), text(class_name)) };
    bind_class(vm, &module, &class_name)
}

/// Runs the foreign method or allocator behind `user_data`. A host failure
/// aborts the current fiber; only a missing key is an error here.
pub(crate) fn dispatch_method(vm: &VM, user_data: *mut c_void) -> Result<()> {
    let key = key_from(user_data)?;
    let method = vm.callbacks.borrow().method(key)?;
    let Some(method) = method else {
        return abort_current_fiber(vm, "foreign class has no allocator");
    };

    let failure = match catch_unwind(AssertUnwindSafe(|| method(vm))) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!("foreign method {key} panicked: {message}");
            format!("foreign method panicked: {message}")
        }
    };
    abort_current_fiber(vm, &failure)
}

fn abort_current_fiber(vm: &VM, message: &str) -> Result<()> {
    log::debug!("aborting fiber: {message}");
    if let Err(err) = vm.abort_fiber_with(message) {
        log::warn!("could not abort fiber with {message:?}: {err}");
    }
    Ok(())
}

unsafe extern "C" fn execute(vm: *mut WrenVM, user_data: *mut c_void) {
    // SAFETY: the native VM passes itself
    let vm = unsafe { host(vm) };
    if let Err(err) = dispatch_method(vm, user_data) {
        fatal(err);
    }
}

/// Detaches the host object from the collected instance at `data` and hands
/// it to the class finalizer, if any. Runs during collection and teardown.
pub(crate) fn dispatch_finalizer(vm: &VM, data: *mut c_void, user_data: *mut c_void) -> Result<()> {
    let key = key_from(user_data)?;
    let finalizer = vm.callbacks.borrow().finalizer(key)?;
    let object = vm.foreign.borrow_mut().detach(data as usize)?;
    if let Some(finalizer) = finalizer {
        contain("finalize", || finalizer(object));
    }
    Ok(())
}

unsafe extern "C" fn finalize_foreign(vm: *mut WrenVM, data: *mut c_void, user_data: *mut c_void) {
    // SAFETY: the native VM passes itself
    let vm = unsafe { host(vm) };
    if let Err(err) = dispatch_finalizer(vm, data, user_data) {
        fatal(err);
    }
}

pub(crate) fn deliver_write(vm: &VM, text: &str) {
    if let Some(hook) = vm.config().and_then(|config| config.write_fn.as_ref()) {
        contain("write", || hook(vm, text));
    }
}

unsafe extern "C" fn write(vm: *mut WrenVM, message: *const c_char) {
    // SAFETY: the native VM passes itself and a valid string
    let (vm, message) = unsafe { (host(vm), text(message)) };
    deliver_write(vm, &message);
}

pub(crate) fn deliver_error(vm: &VM, report: &ErrorReport) {
    if let Some(hook) = vm.config().and_then(|config| config.error_fn.as_ref()) {
        contain("error", || hook(vm, report));
    }
}

unsafe extern "C" fn error(
    vm: *mut WrenVM,
    kind: c_int,
    module: *const c_char,
    line: c_int,
    message: *const c_char,
) {
    // SAFETY: the native VM passes itself and valid (possibly null) strings
    let (vm, module, message) = unsafe { (host(vm), text(module), text(message)) };
    let report = ErrorReport {
        kind: ErrorKind::from_raw(kind),
        module: module.into_owned(),
        line,
        message: message.into_owned(),
    };
    deliver_error(vm, &report);
}
