//! An in-process stand-in for the native VM, exposed through the same
//! [`NativeApi`] table as the real library.
//!
//! Scripts are line commands instead of the real language:
//!
//! ```text
//! print <text>                write <text>, then "\n"
//! import "<name>"             resolve, load and run another module
//! var <name> = <value>        define a module variable
//! foreign class <Class>       bind a foreign class
//! foreign [static] <C>.<sig>  bind a foreign method
//! call <C>.<sig> <args...>    run a bound method, write its result
//! new <Class> <args...>       construct an instance
//! keep <Class> <args...>      same, but the instance survives GC
//! fail <message>              runtime error with a one-frame stack trace
//! syntax                      compile error
//! loop                        spin until early exit is requested
//! ```
//!
//! Arguments are literals or module variables. `var f = fn <command>`
//! defines a closure; calling it runs the command with `$1`, `$2`, ...
//! replaced by the arguments.

use core::ffi::{c_char, c_int, c_void};
use std::{
    borrow::Cow,
    cell::{Cell, RefCell},
    collections::HashMap,
    ffi::{CStr, CString},
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use once_cell::sync::Lazy;

use crate::{
    VM,
    ffi::{self, WrenBindForeignMethodResult, WrenConfiguration, WrenForeignClassMethods, WrenHandle, WrenVM},
    native::NativeApi,
};

static API: Lazy<NativeApi> = Lazy::new(|| NativeApi {
    library: None,
    init_configuration,
    new_vm,
    free_vm,
    collect_garbage,
    early_exit,
    get_allocated,
    interpret,
    make_call_handle,
    call,
    release_handle,
    get_slot_count,
    ensure_slots,
    get_slot_type,
    get_slot_bool,
    get_slot_bytes,
    get_slot_double,
    get_slot_foreign,
    get_slot_handle,
    set_slot_bool,
    set_slot_bytes,
    set_slot_double,
    set_slot_new_foreign,
    set_slot_new_list,
    set_slot_new_map,
    set_slot_null,
    set_slot_handle,
    get_list_count,
    get_list_element,
    set_list_element,
    insert_in_list,
    get_map_count,
    get_map_contains_key,
    get_map_value,
    set_map_value,
    remove_map_value,
    get_variable,
    has_variable,
    has_module,
    abort_fiber,
});

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(Vec<u8>),
    Foreign(*mut c_void),
    Class(String),
    Fn(String),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
}

impl Value {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "null" => Some(Self::Null),
            "true" => Some(Self::Bool(true)),
            "false" => Some(Self::Bool(false)),
            _ if token.starts_with("fn ") => Some(Self::Fn(token[3..].trim().to_owned())),
            _ if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') => {
                Some(Self::Str(token[1..token.len() - 1].as_bytes().to_vec()))
            }
            _ => token.parse().ok().map(Self::Num),
        }
    }

    fn raw_type(&self) -> c_int {
        match self {
            Self::Null => ffi::WREN_TYPE_NULL,
            Self::Bool(_) => ffi::WREN_TYPE_BOOL,
            Self::Num(_) => ffi::WREN_TYPE_NUM,
            Self::Str(_) => ffi::WREN_TYPE_STRING,
            Self::Foreign(_) => ffi::WREN_TYPE_FOREIGN,
            Self::List(_) => ffi::WREN_TYPE_LIST,
            Self::Map(_) => ffi::WREN_TYPE_MAP,
            Self::Class(_) | Self::Fn(_) => ffi::WREN_TYPE_UNKNOWN,
        }
    }

    fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Foreign(a), Self::Foreign(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => a == b,
            (Self::Fn(a), Self::Fn(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Num(n) => n.to_string(),
            Self::Str(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Foreign(_) => "instance".to_owned(),
            Self::Class(name) => name.clone(),
            Self::Fn(_) => "Fn".to_owned(),
            Self::List(items) => format!("[list of {}]", items.borrow().len()),
            Self::Map(entries) => format!("[map of {}]", entries.borrow().len()),
        }
    }
}

struct Instance {
    storage: Box<[u8]>,
    class: Option<String>,
    pinned: bool,
}

impl Instance {
    fn data(&self) -> *mut c_void {
        self.storage.as_ptr() as *mut c_void
    }
}

struct FakeHandle(Value);

enum Failure {
    Compile(String),
    Runtime(String),
    /// Already reported by a nested module.
    Reported(c_int),
    Exit,
}

pub(crate) struct FakeVM {
    config: WrenConfiguration,
    slots: RefCell<Vec<Value>>,
    modules: RefCell<HashMap<String, HashMap<String, Value>>>,
    classes: RefCell<HashMap<String, WrenForeignClassMethods>>,
    methods: RefCell<HashMap<String, WrenBindForeignMethodResult>>,
    instances: RefCell<Vec<Instance>>,
    handles: Cell<usize>,
    aborted: RefCell<Option<String>>,
    exit: AtomicBool,
}

impl FakeVM {
    pub(crate) fn api() -> &'static NativeApi {
        &API
    }

    /// The fake behind a VM built on [`FakeVM::api`].
    pub(crate) fn of(vm: &VM) -> &FakeVM {
        // SAFETY: every VM built on the fake table wraps a FakeVM
        unsafe { fake(vm.as_raw()) }
    }

    pub(crate) fn aborted(&self) -> Option<String> {
        self.aborted.borrow().clone()
    }

    pub(crate) fn foreign_data(&self, slot: usize) -> *mut c_void {
        match self.slots.borrow()[slot] {
            Value::Foreign(data) => data,
            ref other => panic!("slot {slot} holds {other:?}"),
        }
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.handles.get()
    }

    pub(crate) fn live_instances(&self) -> usize {
        self.instances.borrow().len()
    }

    pub(crate) fn heap(&self) -> (usize, usize, c_int) {
        (self.config.initialHeapSize, self.config.minHeapSize, self.config.heapGrowthPercent)
    }

    pub(crate) fn slot(&self, slot: usize) -> Value {
        self.slots.borrow()[slot].clone()
    }

    pub(crate) fn set_slot(&self, slot: usize, value: Value) {
        self.slots.borrow_mut()[slot] = value;
    }

    fn run(&self, vm: *mut WrenVM, module: &str, source: &str) -> c_int {
        self.modules.borrow_mut().entry(module.to_owned()).or_default();
        for (index, line) in source.lines().enumerate() {
            if self.exit.load(Ordering::SeqCst) {
                return ffi::WREN_RESULT_RUNTIME_ERROR;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            let outcome = match command {
                "print" => {
                    self.write(vm, rest);
                    self.write(vm, "\n");
                    Ok(())
                }
                "import" => self.import(vm, module, rest.trim().trim_matches('"')),
                "var" => self.define(module, rest),
                "foreign" => self.bind(vm, module, rest),
                "call" => self.call_foreign(vm, module, rest),
                "new" => self.construct(vm, module, rest, false),
                "keep" => self.construct(vm, module, rest, true),
                "fail" => Err(Failure::Runtime(rest.to_owned())),
                "syntax" => Err(Failure::Compile("Expect expression.".to_owned())),
                "loop" => {
                    while !self.exit.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(1));
                    }
                    Err(Failure::Exit)
                }
                _ => Err(Failure::Compile(format!("Unknown command '{command}'."))),
            };

            let line = index as c_int + 1;
            match outcome {
                Ok(()) => {}
                Err(Failure::Compile(message)) => {
                    self.report(vm, ffi::WREN_ERROR_COMPILE, Some(module), line, &message);
                    return ffi::WREN_RESULT_COMPILE_ERROR;
                }
                Err(Failure::Runtime(message)) => {
                    self.report(vm, ffi::WREN_ERROR_RUNTIME, None, -1, &message);
                    self.report(vm, ffi::WREN_ERROR_STACK_TRACE, Some(module), line, "(script)");
                    return ffi::WREN_RESULT_RUNTIME_ERROR;
                }
                Err(Failure::Reported(status)) => return status,
                Err(Failure::Exit) => return ffi::WREN_RESULT_RUNTIME_ERROR,
            }
        }
        ffi::WREN_RESULT_SUCCESS
    }

    fn write(&self, vm: *mut WrenVM, text: &str) {
        if let Some(write) = self.config.writeFn {
            let text = CString::new(text).unwrap();
            // SAFETY: hook installed by the bridge
            unsafe { write(vm, text.as_ptr()) };
        }
    }

    fn report(&self, vm: *mut WrenVM, kind: c_int, module: Option<&str>, line: c_int, message: &str) {
        let Some(error) = self.config.errorFn else { return };
        let module = module.map(|module| CString::new(module).unwrap());
        let message = CString::new(message).unwrap();
        let module_ptr = module.as_ref().map_or(core::ptr::null(), |module| module.as_ptr());
        // SAFETY: hook installed by the bridge
        unsafe { error(vm, kind, module_ptr, line, message.as_ptr()) };
    }

    fn import(&self, vm: *mut WrenVM, importer: &str, name: &str) -> Result<(), Failure> {
        let resolved = match self.config.resolveModuleFn {
            Some(resolve) => {
                let (importer_c, name_c) = (CString::new(importer).unwrap(), CString::new(name).unwrap());
                // SAFETY: hook installed by the bridge
                let ptr = unsafe { resolve(vm, importer_c.as_ptr(), name_c.as_ptr()) };
                if ptr.is_null() {
                    return Err(Failure::Runtime(format!(
                        "Could not resolve module '{name}' imported from '{importer}'."
                    )));
                }
                // SAFETY: resolved names are malloc'd, NUL-terminated and ours to free
                let resolved = unsafe { text(ptr) }.into_owned();
                unsafe { libc::free(ptr as *mut c_void) };
                resolved
            }
            None => name.to_owned(),
        };
        if self.modules.borrow().contains_key(&resolved) {
            return Ok(());
        }

        let not_found = || Failure::Runtime(format!("Could not load module '{resolved}'."));
        let Some(load) = self.config.loadModuleFn else { return Err(not_found()) };
        let resolved_c = CString::new(resolved.as_str()).unwrap();
        // SAFETY: hook installed by the bridge
        let result = unsafe { load(vm, resolved_c.as_ptr()) };
        if result.source.is_null() {
            return Err(not_found());
        }
        // SAFETY: the hook lends a NUL-terminated source until onComplete
        let source = unsafe { text(result.source) }.into_owned();
        if let Some(complete) = result.onComplete {
            // SAFETY: hook installed by the bridge, called once with its own result
            unsafe { complete(vm, resolved_c.as_ptr(), result) };
        }

        match self.run(vm, &resolved, &source) {
            ffi::WREN_RESULT_SUCCESS => Ok(()),
            status => Err(Failure::Reported(status)),
        }
    }

    fn define(&self, module: &str, rest: &str) -> Result<(), Failure> {
        let (name, value) = rest
            .split_once('=')
            .ok_or_else(|| Failure::Compile("Expect '=' after variable name.".to_owned()))?;
        let value = Value::parse(value.trim())
            .ok_or_else(|| Failure::Compile(format!("Cannot parse '{}'.", value.trim())))?;
        let mut modules = self.modules.borrow_mut();
        modules
            .entry(module.to_owned())
            .or_default()
            .insert(name.trim().to_owned(), value);
        Ok(())
    }

    fn bind(&self, vm: *mut WrenVM, module: &str, rest: &str) -> Result<(), Failure> {
        let module_c = CString::new(module).unwrap();
        if let Some(class) = rest.strip_prefix("class ") {
            let class = class.trim();
            let class_c = CString::new(class).unwrap();
            let methods = match self.config.bindForeignClassFn {
                // SAFETY: hook installed by the bridge
                Some(bind) => unsafe { bind(vm, module_c.as_ptr(), class_c.as_ptr()) },
                None => WrenForeignClassMethods::none(),
            };
            self.classes.borrow_mut().insert(class.to_owned(), methods);
            let mut modules = self.modules.borrow_mut();
            let variables = modules.entry(module.to_owned()).or_default();
            variables.insert(class.to_owned(), Value::Class(class.to_owned()));
            return Ok(());
        }

        let (is_static, target) = match rest.strip_prefix("static ") {
            Some(target) => (true, target.trim()),
            None => (false, rest.trim()),
        };
        let (class, signature) = target
            .split_once('.')
            .ok_or_else(|| Failure::Compile("Expect method signature.".to_owned()))?;
        let (class_c, signature_c) = (CString::new(class).unwrap(), CString::new(signature).unwrap());
        let bound = match self.config.bindForeignMethodFn {
            // SAFETY: hook installed by the bridge
            Some(bind) => unsafe {
                bind(vm, module_c.as_ptr(), class_c.as_ptr(), is_static, signature_c.as_ptr())
            },
            None => WrenBindForeignMethodResult::none(),
        };
        if bound.executeFn.is_none() {
            return Err(Failure::Runtime(format!(
                "Could not find foreign method '{signature}' for class {class} in module '{module}'."
            )));
        }
        self.methods.borrow_mut().insert(target.to_owned(), bound);
        Ok(())
    }

    fn arguments<'a>(
        &self,
        module: &str,
        receiver: Value,
        tokens: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<Value>, Failure> {
        let mut arguments = vec![receiver];
        for token in tokens {
            let variable = || self.modules.borrow().get(module)?.get(token).cloned();
            let value = Value::parse(token)
                .or_else(variable)
                .ok_or_else(|| Failure::Compile(format!("Cannot parse '{token}'.")))?;
            arguments.push(value);
        }
        Ok(arguments)
    }

    fn call_foreign(&self, vm: *mut WrenVM, module: &str, rest: &str) -> Result<(), Failure> {
        let mut tokens = rest.split_whitespace();
        let target = tokens.next().unwrap_or_default();
        let bound = self.methods.borrow().get(target).copied();
        let Some(execute) = bound.and_then(|bound| bound.executeFn) else {
            return Err(Failure::Runtime(format!("{target} is not bound.")));
        };
        let class = target.split('.').next().unwrap_or_default();
        let arguments = self.arguments(module, Value::Class(class.to_owned()), tokens)?;
        *self.slots.borrow_mut() = arguments;
        self.aborted.borrow_mut().take();

        // SAFETY: trampoline and key handed out by the bind hook
        unsafe { execute(vm, bound.map_or(core::ptr::null_mut(), |bound| bound.userData)) };
        if let Some(message) = self.aborted.borrow_mut().take() {
            return Err(Failure::Runtime(message));
        }
        let result = self.slots.borrow()[0].display();
        self.write(vm, &result);
        self.write(vm, "\n");
        Ok(())
    }

    fn construct(&self, vm: *mut WrenVM, module: &str, rest: &str, keep: bool) -> Result<(), Failure> {
        let mut tokens = rest.split_whitespace();
        let class = tokens.next().unwrap_or_default();
        let methods = self.classes.borrow().get(class).copied();
        let Some(methods) = methods else {
            return Err(Failure::Runtime(format!("{class} is not a foreign class.")));
        };
        let Some(allocate) = methods.allocate else {
            return Err(Failure::Runtime(format!("{class} has no allocator.")));
        };
        let arguments = self.arguments(module, Value::Class(class.to_owned()), tokens)?;
        *self.slots.borrow_mut() = arguments;
        self.aborted.borrow_mut().take();

        // SAFETY: trampoline and key handed out by the bind hook
        unsafe { allocate(vm, methods.allocateUserData) };
        if let Some(message) = self.aborted.borrow_mut().take() {
            return Err(Failure::Runtime(message));
        }
        if keep {
            let data = self.foreign_data(0);
            for instance in self.instances.borrow_mut().iter_mut() {
                if instance.data() == data {
                    instance.pinned = true;
                }
            }
        }
        Ok(())
    }

    fn finalize(&self, vm: *mut WrenVM, instance: &Instance) {
        let Some(class) = &instance.class else { return };
        let methods = self.classes.borrow().get(class).copied();
        if let Some(WrenForeignClassMethods {
            finalize: Some(finalize),
            finalizeUserData: user_data,
            ..
        }) = methods
        {
            // SAFETY: trampoline and key handed out by the bind hook
            unsafe { finalize(vm, instance.data(), user_data) };
        }
    }

    fn collect(&self, vm: *mut WrenVM, everything: bool) {
        let doomed: Vec<Instance> = {
            let mut instances = self.instances.borrow_mut();
            let (doomed, kept) = instances
                .drain(..)
                .partition(|instance| everything || !instance.pinned);
            *instances = kept;
            doomed
        };
        for instance in &doomed {
            self.finalize(vm, instance);
        }
    }
}

/// # Safety
///
/// `vm` must come from the fake `new_vm` and not yet be freed.
unsafe fn fake<'a>(vm: *mut WrenVM) -> &'a FakeVM {
    // SAFETY: upheld by the caller
    unsafe { &*(vm as *const FakeVM) }
}

unsafe fn text<'a>(ptr: *const c_char) -> Cow<'a, str> {
    // SAFETY: callers pass NUL-terminated strings
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

unsafe extern "C" fn init_configuration(config: *mut WrenConfiguration) {
    let mut defaults = WrenConfiguration::zeroed();
    defaults.initialHeapSize = 10 * 1024 * 1024;
    defaults.minHeapSize = 1024 * 1024;
    defaults.heapGrowthPercent = 50;
    // SAFETY: caller passes a writable configuration
    unsafe { *config = defaults };
}

unsafe extern "C" fn new_vm(config: *mut WrenConfiguration) -> *mut WrenVM {
    let config = if config.is_null() {
        let mut defaults = WrenConfiguration::zeroed();
        unsafe { init_configuration(&mut defaults) };
        defaults
    } else {
        unsafe { *config }
    };
    let vm = FakeVM {
        config,
        slots: RefCell::new(Vec::new()),
        modules: RefCell::new(HashMap::new()),
        classes: RefCell::new(HashMap::new()),
        methods: RefCell::new(HashMap::new()),
        instances: RefCell::new(Vec::new()),
        handles: Cell::new(0),
        aborted: RefCell::new(None),
        exit: AtomicBool::new(false),
    };
    Box::into_raw(Box::new(vm)) as *mut WrenVM
}

unsafe extern "C" fn free_vm(vm: *mut WrenVM) {
    unsafe { fake(vm) }.collect(vm, true);
    drop(unsafe { Box::from_raw(vm as *mut FakeVM) });
}

unsafe extern "C" fn collect_garbage(vm: *mut WrenVM) {
    unsafe { fake(vm) }.collect(vm, false);
}

unsafe extern "C" fn early_exit(vm: *mut WrenVM) {
    unsafe { fake(vm) }.exit.store(true, Ordering::SeqCst);
}

unsafe extern "C" fn get_allocated(vm: *mut WrenVM) -> usize {
    let vm = unsafe { fake(vm) };
    let foreign: usize = vm.instances.borrow().iter().map(|i| i.storage.len()).sum();
    4096 + foreign + vm.slots.borrow().len() * 16
}

unsafe extern "C" fn interpret(vm: *mut WrenVM, module: *const c_char, source: *const c_char) -> c_int {
    let (module, source) = unsafe { (text(module), text(source)) };
    unsafe { fake(vm) }.run(vm, &module, &source)
}

fn new_handle(vm: &FakeVM, value: Value) -> *mut WrenHandle {
    vm.handles.set(vm.handles.get() + 1);
    Box::into_raw(Box::new(FakeHandle(value))) as *mut WrenHandle
}

unsafe extern "C" fn make_call_handle(vm: *mut WrenVM, signature: *const c_char) -> *mut WrenHandle {
    let signature = unsafe { text(signature) }.into_owned();
    new_handle(unsafe { fake(vm) }, Value::Str(signature.into_bytes()))
}

unsafe extern "C" fn call(raw: *mut WrenVM, handle: *mut WrenHandle) -> c_int {
    let vm = unsafe { fake(raw) };
    if vm.exit.load(Ordering::SeqCst) {
        return ffi::WREN_RESULT_RUNTIME_ERROR;
    }
    let handle = unsafe { &*(handle as *const FakeHandle) };
    let receiver = vm.slots.borrow().first().cloned();
    if let Some(Value::Fn(body)) = receiver {
        let mut command = body;
        let slots = vm.slots.borrow().clone();
        for (index, argument) in slots.iter().enumerate().skip(1).rev() {
            command = command.replace(&format!("${index}"), &argument.display());
        }
        let status = vm.run(raw, "main", &command);
        vm.slots.borrow_mut()[0] = Value::Null;
        return status;
    }
    let mut slots = vm.slots.borrow_mut();
    if slots.is_empty() {
        slots.push(Value::Null);
    }
    slots[0] = Value::Str(format!("called {}", handle.0.display()).into_bytes());
    ffi::WREN_RESULT_SUCCESS
}

unsafe extern "C" fn release_handle(vm: *mut WrenVM, handle: *mut WrenHandle) {
    let vm = unsafe { fake(vm) };
    vm.handles.set(vm.handles.get() - 1);
    drop(unsafe { Box::from_raw(handle as *mut FakeHandle) });
}

unsafe extern "C" fn get_slot_count(vm: *mut WrenVM) -> c_int {
    unsafe { fake(vm) }.slots.borrow().len() as c_int
}

unsafe extern "C" fn ensure_slots(vm: *mut WrenVM, count: c_int) {
    let mut slots = unsafe { fake(vm) }.slots.borrow_mut();
    let count = count as usize;
    if slots.len() < count {
        slots.resize(count, Value::Null);
    }
}

unsafe extern "C" fn get_slot_type(vm: *mut WrenVM, slot: c_int) -> c_int {
    unsafe { fake(vm) }.slots.borrow()[slot as usize].raw_type()
}

unsafe extern "C" fn get_slot_bool(vm: *mut WrenVM, slot: c_int) -> bool {
    matches!(unsafe { fake(vm) }.slots.borrow()[slot as usize], Value::Bool(true))
}

unsafe extern "C" fn get_slot_bytes(vm: *mut WrenVM, slot: c_int, length: *mut c_int) -> *const c_char {
    match &unsafe { fake(vm) }.slots.borrow()[slot as usize] {
        Value::Str(bytes) => {
            unsafe { *length = bytes.len() as c_int };
            bytes.as_ptr() as *const c_char
        }
        other => panic!("slot {slot} holds {other:?}"),
    }
}

unsafe extern "C" fn get_slot_double(vm: *mut WrenVM, slot: c_int) -> f64 {
    match unsafe { fake(vm) }.slots.borrow()[slot as usize] {
        Value::Num(n) => n,
        ref other => panic!("slot {slot} holds {other:?}"),
    }
}

unsafe extern "C" fn get_slot_foreign(vm: *mut WrenVM, slot: c_int) -> *mut c_void {
    unsafe { fake(vm) }.foreign_data(slot as usize)
}

unsafe extern "C" fn get_slot_handle(vm: *mut WrenVM, slot: c_int) -> *mut WrenHandle {
    let vm = unsafe { fake(vm) };
    let value = vm.slot(slot as usize);
    new_handle(vm, value)
}

fn set(vm: *mut WrenVM, slot: c_int, value: Value) {
    unsafe { fake(vm) }.slots.borrow_mut()[slot as usize] = value;
}

unsafe extern "C" fn set_slot_bool(vm: *mut WrenVM, slot: c_int, value: bool) {
    set(vm, slot, Value::Bool(value));
}

unsafe extern "C" fn set_slot_bytes(vm: *mut WrenVM, slot: c_int, bytes: *const c_char, length: usize) {
    let bytes = if length == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(bytes as *const u8, length) }.to_vec()
    };
    set(vm, slot, Value::Str(bytes));
}

unsafe extern "C" fn set_slot_double(vm: *mut WrenVM, slot: c_int, value: f64) {
    set(vm, slot, Value::Num(value));
}

unsafe extern "C" fn set_slot_new_foreign(vm: *mut WrenVM, slot: c_int, class_slot: c_int, size: usize) -> *mut c_void {
    let fake_vm = unsafe { fake(vm) };
    let class = match fake_vm.slot(class_slot as usize) {
        Value::Class(name) => Some(name),
        _ => None,
    };
    let instance = Instance {
        storage: vec![0; size.max(1)].into_boxed_slice(),
        class,
        pinned: false,
    };
    let data = instance.data();
    fake_vm.instances.borrow_mut().push(instance);
    set(vm, slot, Value::Foreign(data));
    data
}

unsafe extern "C" fn set_slot_new_list(vm: *mut WrenVM, slot: c_int) {
    set(vm, slot, Value::List(Rc::default()));
}

unsafe extern "C" fn set_slot_new_map(vm: *mut WrenVM, slot: c_int) {
    set(vm, slot, Value::Map(Rc::default()));
}

unsafe extern "C" fn set_slot_null(vm: *mut WrenVM, slot: c_int) {
    set(vm, slot, Value::Null);
}

unsafe extern "C" fn set_slot_handle(vm: *mut WrenVM, slot: c_int, handle: *mut WrenHandle) {
    let value = unsafe { &*(handle as *const FakeHandle) }.0.clone();
    set(vm, slot, value);
}

fn list(vm: *mut WrenVM, slot: c_int) -> Rc<RefCell<Vec<Value>>> {
    match unsafe { fake(vm) }.slot(slot as usize) {
        Value::List(items) => items,
        other => panic!("slot {slot} holds {other:?}"),
    }
}

fn map(vm: *mut WrenVM, slot: c_int) -> Rc<RefCell<Vec<(Value, Value)>>> {
    match unsafe { fake(vm) }.slot(slot as usize) {
        Value::Map(entries) => entries,
        other => panic!("slot {slot} holds {other:?}"),
    }
}

unsafe extern "C" fn get_list_count(vm: *mut WrenVM, slot: c_int) -> c_int {
    list(vm, slot).borrow().len() as c_int
}

unsafe extern "C" fn get_list_element(vm: *mut WrenVM, list_slot: c_int, index: c_int, element_slot: c_int) {
    let element = list(vm, list_slot).borrow()[index as usize].clone();
    set(vm, element_slot, element);
}

unsafe extern "C" fn set_list_element(vm: *mut WrenVM, list_slot: c_int, index: c_int, element_slot: c_int) {
    let element = unsafe { fake(vm) }.slot(element_slot as usize);
    list(vm, list_slot).borrow_mut()[index as usize] = element;
}

unsafe extern "C" fn insert_in_list(vm: *mut WrenVM, list_slot: c_int, index: c_int, element_slot: c_int) {
    let element = unsafe { fake(vm) }.slot(element_slot as usize);
    list(vm, list_slot).borrow_mut().insert(index as usize, element);
}

unsafe extern "C" fn get_map_count(vm: *mut WrenVM, slot: c_int) -> c_int {
    map(vm, slot).borrow().len() as c_int
}

unsafe extern "C" fn get_map_contains_key(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int) -> bool {
    let key = unsafe { fake(vm) }.slot(key_slot as usize);
    map(vm, map_slot).borrow().iter().any(|(k, _)| k.same(&key))
}

unsafe extern "C" fn get_map_value(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int, value_slot: c_int) {
    let key = unsafe { fake(vm) }.slot(key_slot as usize);
    let value = map(vm, map_slot)
        .borrow()
        .iter()
        .find(|(k, _)| k.same(&key))
        .map_or(Value::Null, |(_, v)| v.clone());
    set(vm, value_slot, value);
}

unsafe extern "C" fn set_map_value(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int, value_slot: c_int) {
    let fake_vm = unsafe { fake(vm) };
    let (key, value) = (fake_vm.slot(key_slot as usize), fake_vm.slot(value_slot as usize));
    let entries = map(vm, map_slot);
    let mut entries = entries.borrow_mut();
    match entries.iter_mut().find(|(k, _)| k.same(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

unsafe extern "C" fn remove_map_value(vm: *mut WrenVM, map_slot: c_int, key_slot: c_int, removed_slot: c_int) {
    let key = unsafe { fake(vm) }.slot(key_slot as usize);
    let entries = map(vm, map_slot);
    let removed = {
        let mut entries = entries.borrow_mut();
        match entries.iter().position(|(k, _)| k.same(&key)) {
            Some(index) => entries.remove(index).1,
            None => Value::Null,
        }
    };
    set(vm, removed_slot, removed);
}

unsafe extern "C" fn get_variable(vm: *mut WrenVM, module: *const c_char, name: *const c_char, slot: c_int) {
    let (module, name) = unsafe { (text(module), text(name)) };
    let value = unsafe { fake(vm) }.modules.borrow()[&*module][&*name].clone();
    set(vm, slot, value);
}

unsafe extern "C" fn has_variable(vm: *mut WrenVM, module: *const c_char, name: *const c_char) -> bool {
    let (module, name) = unsafe { (text(module), text(name)) };
    let modules = unsafe { fake(vm) }.modules.borrow();
    let variables = modules.get(&*module).expect("Could not find module.");
    variables.contains_key(&*name)
}

unsafe extern "C" fn has_module(vm: *mut WrenVM, module: *const c_char) -> bool {
    let module = unsafe { text(module) };
    unsafe { fake(vm) }.modules.borrow().contains_key(&*module)
}

unsafe extern "C" fn abort_fiber(vm: *mut WrenVM, slot: c_int) {
    let fake_vm = unsafe { fake(vm) };
    let message = fake_vm.slot(slot as usize).display();
    *fake_vm.aborted.borrow_mut() = Some(message);
}
