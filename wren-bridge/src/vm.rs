use core::ffi::{c_char, c_int};
use std::{
    any::{Any, type_name},
    cell::{Cell, RefCell},
    collections::HashSet,
    ffi::CString,
    marker::PhantomData,
    ops::Deref,
    ptr::NonNull,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    CallbackRegistry, Config, Error, ForeignTable, InterpretResult, Result, SourceLedger,
    ValueType,
    ffi::{WrenConfiguration, WrenHandle, WrenVM},
    handles::{VMRef, VMS, native_id},
    native::{self, NativeApi},
    trampolines,
};

/// Host-side state of one native VM, and the slot API host callbacks use to
/// exchange values with scripts. Owned through [`OwnedVM`]; callbacks only
/// ever see `&VM`.
pub struct VM {
    raw: NonNull<WrenVM>,
    api: &'static NativeApi,
    config: Option<Config>,
    pub(crate) callbacks: RefCell<CallbackRegistry>,
    pub(crate) foreign: RefCell<ForeignTable>,
    pub(crate) sources: RefCell<SourceLedger>,
    user_data: RefCell<Option<Rc<dyn Any>>>,
    handles: Rc<HandleLedger>,
    exit: Arc<ExitGate>,
}

#[derive(Debug, Clone, Copy)]
struct RawVM(NonNull<WrenVM>);

// SAFETY: only handed to `wrenEarlyExit`, which may be called from any thread
unsafe impl Send for RawVM {}

/// Serialises early-exit requests against VM teardown.
struct ExitGate {
    api: &'static NativeApi,
    vm: Mutex<Option<RawVM>>,
    requested: AtomicBool,
}

impl ExitGate {
    fn request(&self) -> bool {
        self.requested.store(true, Ordering::SeqCst);
        let vm = self.vm.lock();
        match *vm {
            Some(RawVM(raw)) => {
                // SAFETY: the gate is closed before the VM is freed, and we hold
                // the lock
                unsafe { (self.api.early_exit)(raw.as_ptr()) };
                true
            }
            None => false,
        }
    }

    fn close(&self) {
        self.vm.lock().take();
    }
}

/// Requests early termination of a VM from any thread. Once the VM has been
/// freed the request is ignored.
#[derive(Clone)]
pub struct ExitHandle {
    gate: Arc<ExitGate>,
}

impl ExitHandle {
    /// Returns `false` if the VM no longer exists.
    pub fn early_exit(&self) -> bool {
        let delivered = self.gate.request();
        log::debug!("early exit requested (delivered: {delivered})");
        delivered
    }

    pub fn is_requested(&self) -> bool {
        self.gate.requested.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ExitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitHandle")
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// Native handles a VM has issued and not yet released. Every [`Handle`]
/// shares it, so a handle may outlive the callback that created it; teardown
/// releases whatever is left and turns the rest inert.
struct HandleLedger {
    api: &'static NativeApi,
    vm: Cell<Option<NonNull<WrenVM>>>,
    live: RefCell<HashSet<usize>>,
}

impl HandleLedger {
    fn issue(self: &Rc<Self>, raw: NonNull<WrenHandle>) -> Handle {
        self.live.borrow_mut().insert(raw.as_ptr() as usize);
        Handle {
            raw,
            ledger: self.clone(),
        }
    }

    fn is_open(&self) -> bool {
        self.vm.get().is_some()
    }

    fn release(&self, raw: NonNull<WrenHandle>) {
        let Some(vm) = self.vm.get() else { return };
        if self.live.borrow_mut().remove(&(raw.as_ptr() as usize)) {
            // SAFETY: issued by `vm`, which has not been freed
            unsafe { (self.api.release_handle)(vm.as_ptr(), raw.as_ptr()) };
        }
    }

    /// Releases every outstanding handle. Returns how many there were.
    fn close(&self) -> usize {
        let Some(vm) = self.vm.take() else { return 0 };
        let live: Vec<usize> = self.live.borrow_mut().drain().collect();
        for raw in &live {
            // SAFETY: issued by `vm`, which is freed only after this
            unsafe { (self.api.release_handle)(vm.as_ptr(), *raw as *mut WrenHandle) };
        }
        live.len()
    }
}

/// A reference to a VM value that keeps it alive. Released when dropped,
/// or by the VM's teardown if that comes first.
pub struct Handle {
    raw: NonNull<WrenHandle>,
    ledger: Rc<HandleLedger>,
}

impl Handle {
    pub fn release(self) {}

    pub fn as_ptr(&self) -> *mut WrenHandle {
        self.raw.as_ptr()
    }

    /// `false` once the VM that issued the handle has been freed.
    pub fn is_live(&self) -> bool {
        self.ledger.is_open()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.ledger.release(self.raw);
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("raw", &self.raw)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A method handle from [`VM::make_call_handle`]. Only these can be passed
/// to [`VM::call`].
#[derive(Debug)]
pub struct CallHandle {
    handle: Handle,
    arity: usize,
}

impl CallHandle {
    pub fn release(self) {}

    /// Number of arguments the signature takes, not counting the receiver.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }
}

/// Owns a native VM. Dropping it (or calling [`OwnedVM::free`]) tears the
/// VM down: foreign finalizers run, callback keys are released and the
/// handle table entry is removed.
pub struct OwnedVM {
    vm: NonNull<VM>,
    _marker: PhantomData<VM>,
}

impl OwnedVM {
    /// A VM with no host hooks, using the default native library.
    pub fn new() -> Result<Self> {
        Self::bare(native::api()?)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_api(native::api()?, config)
    }

    /// A VM with no hooks wired. It is never registered in the handle table,
    /// so it can evaluate scripts but not call back into the host.
    pub fn bare(api: &'static NativeApi) -> Result<Self> {
        // SAFETY: a null configuration selects the native defaults
        let raw = unsafe { (api.new_vm)(std::ptr::null_mut()) };
        let raw = NonNull::new(raw).ok_or(Error::VMAllocation)?;
        log::debug!("created bare VM {:#x}", native_id(raw.as_ptr()));
        Ok(Self::adopt(VM::new(raw, api, None)))
    }

    pub fn with_api(api: &'static NativeApi, config: Config) -> Result<Self> {
        let mut native = WrenConfiguration::zeroed();
        // SAFETY: `native` is a valid, writable configuration
        unsafe { (api.init_configuration)(&mut native) };
        trampolines::wire(&config, &mut native);

        // SAFETY: the configuration is fully initialised; the VM copies it
        let raw = unsafe { (api.new_vm)(&mut native) };
        let raw = NonNull::new(raw).ok_or(Error::VMAllocation)?;

        let owned = Self::adopt(VM::new(raw, api, Some(config)));
        VMS.register(native_id(raw.as_ptr()), VMRef(owned.vm));
        log::debug!("registered VM {:#x}", native_id(raw.as_ptr()));
        Ok(owned)
    }

    fn adopt(vm: VM) -> Self {
        Self {
            vm: NonNull::from(Box::leak(Box::new(vm))),
            _marker: PhantomData,
        }
    }

    /// Explicit form of drop.
    pub fn free(self) {}
}

impl Deref for OwnedVM {
    type Target = VM;

    fn deref(&self) -> &VM {
        // SAFETY: the allocation lives until `drop` below
        unsafe { self.vm.as_ref() }
    }
}

impl Drop for OwnedVM {
    fn drop(&mut self) {
        // Only shared references exist while the native VM shuts down:
        // finalizers resolve this VM through the handle table.
        let vm: &VM = unsafe { self.vm.as_ref() };
        let id = native_id(vm.as_raw());

        vm.exit.close();
        let handles = vm.handles.close();
        // SAFETY: no early exit can reach the VM anymore and no call is in
        // progress (we are the owner)
        unsafe { (vm.api.free_vm)(vm.as_raw()) };

        let released = vm.callbacks.borrow_mut().release_all();
        if vm.config.is_some() {
            VMS.unregister(id);
        }

        let leaked = vm.sources.borrow_mut().reclaim_all();
        if leaked > 0 {
            log::warn!("VM {id:#x} never completed {leaked} module load(s)");
        }
        let orphans = vm.foreign.borrow_mut().drain();
        if !orphans.is_empty() {
            log::warn!("VM {id:#x} freed with {} unfinalized foreign object(s)", orphans.len());
        }
        log::debug!("freed VM {id:#x} ({released} callback keys, {handles} handles released)");

        // SAFETY: allocated by `adopt`; the handle table no longer refers to it
        drop(unsafe { Box::from_raw(self.vm.as_ptr()) });
    }
}

impl VM {
    fn new(raw: NonNull<WrenVM>, api: &'static NativeApi, config: Option<Config>) -> Self {
        Self {
            raw,
            api,
            config,
            callbacks: RefCell::new(CallbackRegistry::new()),
            foreign: RefCell::new(ForeignTable::new()),
            sources: RefCell::new(SourceLedger::new()),
            user_data: RefCell::new(None),
            handles: Rc::new(HandleLedger {
                api,
                vm: Cell::new(Some(raw)),
                live: RefCell::new(HashSet::new()),
            }),
            exit: Arc::new(ExitGate {
                api,
                vm: Mutex::new(Some(RawVM(raw))),
                requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn as_raw(&self) -> *mut WrenVM {
        self.raw.as_ptr()
    }

    pub(crate) fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    pub fn user_data<T: Any>(&self) -> Option<Rc<T>> {
        let data = self.user_data.borrow().clone()?;
        data.downcast::<T>().ok()
    }

    pub fn set_user_data<T: Any>(&self, value: T) {
        *self.user_data.borrow_mut() = Some(Rc::new(value));
    }

    pub fn take_user_data(&self) -> Option<Rc<dyn Any>> {
        self.user_data.borrow_mut().take()
    }

    /// Number of host objects currently attached to foreign instances.
    pub fn foreign_count(&self) -> usize {
        self.foreign.borrow().len()
    }

    /// Module sources lent to the VM and not yet handed back.
    pub fn pending_sources(&self) -> usize {
        self.sources.borrow().outstanding()
    }

    pub fn interpret(&self, module: &str, source: &str) -> Result<InterpretResult> {
        let module = CString::new(module)?;
        let source = CString::new(source)?;
        if self.exit.requested.load(Ordering::SeqCst) {
            log::debug!("interpret refused: early exit was requested");
            return Ok(InterpretResult::RuntimeError);
        }
        // SAFETY: both strings outlive the call
        let result = unsafe { (self.api.interpret)(self.as_raw(), module.as_ptr(), source.as_ptr()) };
        Ok(InterpretResult::from_raw(result))
    }

    /// Handle for calling `signature` (e.g. `"call(_)"`) on the receiver in
    /// slot 0.
    pub fn make_call_handle(&self, signature: &str) -> Result<CallHandle> {
        let arity = signature.bytes().filter(|&b| b == b'_').count();
        let signature = CString::new(signature)?;
        // SAFETY: the signature outlives the call
        let raw = unsafe { (self.api.make_call_handle)(self.as_raw(), signature.as_ptr()) };
        Ok(CallHandle {
            handle: self.wrap_handle(raw)?,
            arity,
        })
    }

    /// Calls `handle` with the receiver in slot 0 and its arguments in the
    /// slots after it.
    pub fn call(&self, handle: &CallHandle) -> Result<InterpretResult> {
        self.check_handle(&handle.handle)?;
        let count = self.slot_count();
        if count <= handle.arity {
            return Err(Error::SlotOutOfRange {
                slot: handle.arity,
                count,
            });
        }
        if self.exit.requested.load(Ordering::SeqCst) {
            return Ok(InterpretResult::RuntimeError);
        }
        // SAFETY: a live method handle of this VM, with receiver and
        // arguments in range
        let result = unsafe { (self.api.call)(self.as_raw(), handle.handle.as_ptr()) };
        Ok(InterpretResult::from_raw(result))
    }

    pub fn early_exit(&self) -> bool {
        self.exit_handle().early_exit()
    }

    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle {
            gate: self.exit.clone(),
        }
    }

    pub fn collect_garbage(&self) {
        // SAFETY: valid VM
        unsafe { (self.api.collect_garbage)(self.as_raw()) }
    }

    /// Bytes currently held by the VM's managed heap.
    pub fn bytes_allocated(&self) -> usize {
        // SAFETY: valid VM
        unsafe { (self.api.get_allocated)(self.as_raw()) }
    }

    pub fn slot_count(&self) -> usize {
        // SAFETY: valid VM
        let count = unsafe { (self.api.get_slot_count)(self.as_raw()) };
        count.max(0) as usize
    }

    pub fn ensure_slots(&self, count: usize) {
        // SAFETY: valid VM
        unsafe { (self.api.ensure_slots)(self.as_raw(), to_c_int(count)) }
    }

    pub fn slot_type(&self, slot: usize) -> Result<ValueType> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        let raw = unsafe { (self.api.get_slot_type)(self.as_raw(), slot) };
        Ok(ValueType::from_raw(raw))
    }

    pub fn get_slot_bool(&self, slot: usize) -> Result<bool> {
        let slot = self.typed_slot(slot, ValueType::Bool)?;
        // SAFETY: slot holds a Bool
        Ok(unsafe { (self.api.get_slot_bool)(self.as_raw(), slot) })
    }

    pub fn get_slot_double(&self, slot: usize) -> Result<f64> {
        let slot = self.typed_slot(slot, ValueType::Num)?;
        // SAFETY: slot holds a Num
        Ok(unsafe { (self.api.get_slot_double)(self.as_raw(), slot) })
    }

    /// Raw string contents; embedded NUL bytes are preserved.
    pub fn get_slot_bytes(&self, slot: usize) -> Result<Vec<u8>> {
        let slot = self.typed_slot(slot, ValueType::String)?;
        let mut length: c_int = 0;
        // SAFETY: slot holds a String; the VM reports its length
        let ptr = unsafe { (self.api.get_slot_bytes)(self.as_raw(), slot, &mut length) };
        if ptr.is_null() || length <= 0 {
            return Ok(Vec::new());
        }
        // SAFETY: the VM guarantees `length` readable bytes at `ptr`
        let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, length as usize) };
        Ok(bytes.to_vec())
    }

    /// Invalid UTF-8 is replaced, see [`VM::get_slot_bytes`] for the raw form.
    pub fn get_slot_string(&self, slot: usize) -> Result<String> {
        let bytes = self.get_slot_bytes(slot)?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }

    /// The host object attached to the foreign instance in `slot`.
    pub fn get_slot_foreign(&self, slot: usize) -> Result<Rc<dyn Any>> {
        let slot = self.typed_slot(slot, ValueType::Foreign)?;
        // SAFETY: slot holds a foreign instance
        let data = unsafe { (self.api.get_slot_foreign)(self.as_raw(), slot) };
        self.foreign.borrow().get(data as usize)
    }

    pub fn get_slot_foreign_as<T: Any>(&self, slot: usize) -> Result<Rc<T>> {
        self.get_slot_foreign(slot)?
            .downcast::<T>()
            .map_err(|_| Error::ForeignType {
                slot,
                expected: type_name::<T>(),
            })
    }

    pub fn get_slot_handle(&self, slot: usize) -> Result<Handle> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        let raw = unsafe { (self.api.get_slot_handle)(self.as_raw(), slot) };
        self.wrap_handle(raw)
    }

    pub fn set_slot_bool(&self, slot: usize, value: bool) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        unsafe { (self.api.set_slot_bool)(self.as_raw(), slot, value) };
        Ok(())
    }

    pub fn set_slot_double(&self, slot: usize, value: f64) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        unsafe { (self.api.set_slot_double)(self.as_raw(), slot, value) };
        Ok(())
    }

    /// Stores `bytes` as a string; the VM copies them, NULs included.
    pub fn set_slot_bytes(&self, slot: usize, bytes: &[u8]) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range; the VM copies `bytes.len()` bytes
        unsafe {
            (self.api.set_slot_bytes)(self.as_raw(), slot, bytes.as_ptr() as *const c_char, bytes.len())
        };
        Ok(())
    }

    pub fn set_slot_string(&self, slot: usize, text: &str) -> Result<()> {
        self.set_slot_bytes(slot, text.as_bytes())
    }

    pub fn set_slot_null(&self, slot: usize) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        unsafe { (self.api.set_slot_null)(self.as_raw(), slot) };
        Ok(())
    }

    pub fn set_slot_new_list(&self, slot: usize) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        unsafe { (self.api.set_slot_new_list)(self.as_raw(), slot) };
        Ok(())
    }

    pub fn set_slot_new_map(&self, slot: usize) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        unsafe { (self.api.set_slot_new_map)(self.as_raw(), slot) };
        Ok(())
    }

    pub fn set_slot_handle(&self, slot: usize, handle: &Handle) -> Result<()> {
        self.check_handle(handle)?;
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range and the handle is ours
        unsafe { (self.api.set_slot_handle)(self.as_raw(), slot, handle.as_ptr()) };
        Ok(())
    }

    /// Creates an instance of the foreign class in `class_slot` into `slot`
    /// and attaches `value` to it. Meant for allocators.
    pub fn set_slot_new_foreign<T: Any>(&self, slot: usize, class_slot: usize, value: T) -> Result<()> {
        let slot = self.slot(slot)?;
        let class_slot = self.typed_slot(class_slot, ValueType::Unknown)?;
        // No table borrow may be held here: allocation can trigger a
        // collection, which runs finalizers.
        // SAFETY: both slots are in range and `class_slot` holds a class
        let data = unsafe { (self.api.set_slot_new_foreign)(self.as_raw(), slot, class_slot, 1) };
        if data.is_null() {
            return Err(Error::VMAllocation);
        }
        if let Err(err) = self.foreign.borrow_mut().attach(data as usize, Rc::new(value)) {
            trampolines::fatal(err);
        }
        Ok(())
    }

    pub fn list_count(&self, slot: usize) -> Result<usize> {
        let slot = self.typed_slot(slot, ValueType::List)?;
        // SAFETY: slot holds a List
        let count = unsafe { (self.api.get_list_count)(self.as_raw(), slot) };
        Ok(count.max(0) as usize)
    }

    /// Negative indices count from the end.
    pub fn get_list_element(&self, list_slot: usize, index: isize, element_slot: usize) -> Result<()> {
        let index = self.list_index(list_slot, index, false)?;
        let (list_slot, element_slot) = (self.slot(list_slot)?, self.slot(element_slot)?);
        // SAFETY: slots in range, index validated
        unsafe { (self.api.get_list_element)(self.as_raw(), list_slot, index, element_slot) };
        Ok(())
    }

    pub fn set_list_element(&self, list_slot: usize, index: isize, element_slot: usize) -> Result<()> {
        let index = self.list_index(list_slot, index, false)?;
        let (list_slot, element_slot) = (self.slot(list_slot)?, self.slot(element_slot)?);
        // SAFETY: slots in range, index validated
        unsafe { (self.api.set_list_element)(self.as_raw(), list_slot, index, element_slot) };
        Ok(())
    }

    /// `index` may equal the length, and `-1` appends.
    pub fn insert_in_list(&self, list_slot: usize, index: isize, element_slot: usize) -> Result<()> {
        let index = self.list_index(list_slot, index, true)?;
        let (list_slot, element_slot) = (self.slot(list_slot)?, self.slot(element_slot)?);
        // SAFETY: slots in range, index validated
        unsafe { (self.api.insert_in_list)(self.as_raw(), list_slot, index, element_slot) };
        Ok(())
    }

    pub fn map_count(&self, slot: usize) -> Result<usize> {
        let slot = self.typed_slot(slot, ValueType::Map)?;
        // SAFETY: slot holds a Map
        let count = unsafe { (self.api.get_map_count)(self.as_raw(), slot) };
        Ok(count.max(0) as usize)
    }

    pub fn map_contains_key(&self, map_slot: usize, key_slot: usize) -> Result<bool> {
        let map_slot = self.typed_slot(map_slot, ValueType::Map)?;
        let key_slot = self.slot(key_slot)?;
        // SAFETY: slots validated
        Ok(unsafe { (self.api.get_map_contains_key)(self.as_raw(), map_slot, key_slot) })
    }

    pub fn get_map_value(&self, map_slot: usize, key_slot: usize, value_slot: usize) -> Result<()> {
        let map_slot = self.typed_slot(map_slot, ValueType::Map)?;
        let (key_slot, value_slot) = (self.slot(key_slot)?, self.slot(value_slot)?);
        // SAFETY: slots validated
        unsafe { (self.api.get_map_value)(self.as_raw(), map_slot, key_slot, value_slot) };
        Ok(())
    }

    pub fn set_map_value(&self, map_slot: usize, key_slot: usize, value_slot: usize) -> Result<()> {
        let map_slot = self.typed_slot(map_slot, ValueType::Map)?;
        let (key_slot, value_slot) = (self.slot(key_slot)?, self.slot(value_slot)?);
        // SAFETY: slots validated
        unsafe { (self.api.set_map_value)(self.as_raw(), map_slot, key_slot, value_slot) };
        Ok(())
    }

    /// The removed value (or null) lands in `removed_slot`.
    pub fn remove_map_value(&self, map_slot: usize, key_slot: usize, removed_slot: usize) -> Result<()> {
        let map_slot = self.typed_slot(map_slot, ValueType::Map)?;
        let (key_slot, removed_slot) = (self.slot(key_slot)?, self.slot(removed_slot)?);
        // SAFETY: slots validated
        unsafe { (self.api.remove_map_value)(self.as_raw(), map_slot, key_slot, removed_slot) };
        Ok(())
    }

    pub fn has_module(&self, module: &str) -> Result<bool> {
        let module = CString::new(module)?;
        // SAFETY: the name outlives the call
        Ok(unsafe { (self.api.has_module)(self.as_raw(), module.as_ptr()) })
    }

    /// `false` when the module itself is missing.
    pub fn has_variable(&self, module: &str, name: &str) -> Result<bool> {
        if !self.has_module(module)? {
            return Ok(false);
        }
        let (module, name) = (CString::new(module)?, CString::new(name)?);
        // SAFETY: the module exists and both names outlive the call
        Ok(unsafe { (self.api.has_variable)(self.as_raw(), module.as_ptr(), name.as_ptr()) })
    }

    /// Loads a module-level variable into `slot`.
    pub fn get_variable(&self, module: &str, name: &str, slot: usize) -> Result<()> {
        if self.get_variable_if_present(module, name, slot)? {
            Ok(())
        } else {
            Err(Error::UnknownVariable {
                module: module.to_owned(),
                name: name.to_owned(),
            })
        }
    }

    pub fn get_variable_if_present(&self, module: &str, name: &str, slot: usize) -> Result<bool> {
        let slot = self.slot(slot)?;
        if !self.has_variable(module, name)? {
            return Ok(false);
        }
        let (module, name) = (CString::new(module)?, CString::new(name)?);
        // SAFETY: the variable exists and the slot is in range
        unsafe { (self.api.get_variable)(self.as_raw(), module.as_ptr(), name.as_ptr(), slot) };
        Ok(true)
    }

    /// Aborts the current fiber with the value in `slot` as its error.
    pub fn abort_fiber(&self, slot: usize) -> Result<()> {
        let slot = self.slot(slot)?;
        // SAFETY: slot is in range
        unsafe { (self.api.abort_fiber)(self.as_raw(), slot) };
        Ok(())
    }

    /// Aborts the current fiber with `message`, using slot 0.
    pub fn abort_fiber_with(&self, message: &str) -> Result<()> {
        self.ensure_slots(1);
        self.set_slot_string(0, message)?;
        self.abort_fiber(0)
    }

    fn slot(&self, slot: usize) -> Result<c_int> {
        let count = self.slot_count();
        if slot >= count {
            return Err(Error::SlotOutOfRange { slot, count });
        }
        Ok(slot as c_int)
    }

    fn typed_slot(&self, slot: usize, expected: ValueType) -> Result<c_int> {
        let found = self.slot_type(slot)?;
        if found != expected {
            return Err(Error::SlotType { slot, expected, found });
        }
        Ok(slot as c_int)
    }

    fn list_index(&self, list_slot: usize, index: isize, inserting: bool) -> Result<c_int> {
        let count = self.list_count(list_slot)?;
        let limit = (if inserting { count + 1 } else { count }) as isize;
        let resolved = if index < 0 { limit + index } else { index };
        if resolved < 0 || resolved >= limit {
            return Err(Error::ListIndex { index, count });
        }
        Ok(resolved as c_int)
    }

    fn wrap_handle(&self, raw: *mut WrenHandle) -> Result<Handle> {
        let raw = NonNull::new(raw).ok_or(Error::VMAllocation)?;
        Ok(self.handles.issue(raw))
    }

    fn check_handle(&self, handle: &Handle) -> Result<()> {
        if !handle.is_live() {
            Err(Error::StaleHandle)
        } else if !Rc::ptr_eq(&handle.ledger, &self.handles) {
            Err(Error::ForeignHandle)
        } else {
            Ok(())
        }
    }
}

fn to_c_int(value: usize) -> c_int {
    c_int::try_from(value).unwrap_or(c_int::MAX)
}
