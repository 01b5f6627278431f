use std::{collections::HashMap, fmt::Debug, ptr::NonNull};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{VM, ffi::WrenVM};

/// Maps a native identity to host state. Every operation takes the same
/// lock: trampolines for different VMs may arrive from different threads.
pub struct HandleTable<T> {
    entries: Mutex<HashMap<usize, T>>,
}

impl<T: Copy + Debug> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Panics if `id` is already registered: the native allocator only reuses
    /// an identity after it was unregistered.
    pub fn register(&self, id: usize, value: T) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&id) {
            panic!("native identity {id:#x} registered twice (existing entry {existing:?})");
        }
        entries.insert(id, value);
    }

    pub fn lookup(&self, id: usize) -> Option<T> {
        self.entries.lock().get(&id).copied()
    }

    /// Panics if `id` was never registered.
    pub fn unregister(&self, id: usize) -> T {
        match self.entries.lock().remove(&id) {
            Some(value) => value,
            None => panic!("native identity {id:#x} unregistered without being registered"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Copy + Debug> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning back reference from a native VM to its host wrapper. The
/// wrapper's owner removes the entry before the wrapper is deallocated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VMRef(pub NonNull<VM>);

// SAFETY: the pointer is only dereferenced on the thread driving that VM
unsafe impl Send for VMRef {}

pub(crate) static VMS: Lazy<HandleTable<VMRef>> = Lazy::new(HandleTable::new);

pub(crate) fn native_id(vm: *const WrenVM) -> usize {
    vm as usize
}

/// Number of VMs currently registered in this process.
pub fn live_vms() -> usize {
    VMS.len()
}
