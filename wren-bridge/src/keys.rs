use core::ffi::c_void;
use std::{
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{Error, FinalizerFn, ForeignMethodFn, Result};

static NEXT_KEY: AtomicUsize = AtomicUsize::new(1);

/// Opaque token handed to the native layer as a binding's user data. The
/// native side only stores and echoes it; it is never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackKey(NonZeroUsize);

impl CallbackKey {
    /// Unique for the life of the process: the counter never goes backwards,
    /// so a key is never handed out twice.
    pub fn mint() -> Self {
        let raw = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        match NonZeroUsize::new(raw) {
            Some(raw) => Self(raw),
            None => panic!("callback key space exhausted"),
        }
    }

    pub fn as_user_data(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    pub fn from_user_data(ptr: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(Self)
    }
}

impl fmt::Display for CallbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-VM callbacks reachable through [`CallbackKey`]s. Allocators live with
/// the foreign methods since both run through the execute trampoline.
#[derive(Default)]
pub struct CallbackRegistry {
    methods: HashMap<CallbackKey, Option<ForeignMethodFn>>,
    finalizers: HashMap<CallbackKey, Option<FinalizerFn>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_method(&mut self, method: Option<ForeignMethodFn>) -> CallbackKey {
        let key = CallbackKey::mint();
        self.methods.insert(key, method);
        log::trace!("bound foreign method {key}");
        key
    }

    pub fn bind_finalizer(&mut self, finalizer: Option<FinalizerFn>) -> CallbackKey {
        let key = CallbackKey::mint();
        self.finalizers.insert(key, finalizer);
        log::trace!("bound finalizer {key}");
        key
    }

    /// The callback is cloned out so no borrow is held while it runs.
    pub fn method(&self, key: CallbackKey) -> Result<Option<ForeignMethodFn>> {
        self.methods
            .get(&key)
            .cloned()
            .ok_or(Error::UnknownCallback(key))
    }

    pub fn finalizer(&self, key: CallbackKey) -> Result<Option<FinalizerFn>> {
        self.finalizers
            .get(&key)
            .cloned()
            .ok_or(Error::UnknownCallback(key))
    }

    pub fn len(&self) -> usize {
        self.methods.len() + self.finalizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frees every token; returns how many there were.
    pub fn release_all(&mut self) -> usize {
        let released = self.len();
        self.methods.clear();
        self.finalizers.clear();
        released
    }
}
