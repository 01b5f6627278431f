use core::ffi::c_char;
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    ffi::CString,
    rc::Rc,
};

use crate::{Error, Result};

/// Host objects attached to live foreign instances of one VM, keyed by the
/// address of the instance's native storage.
#[derive(Default)]
pub struct ForeignTable {
    objects: HashMap<usize, Rc<dyn Any>>,
}

impl ForeignTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: usize, object: Rc<dyn Any>) -> Result<()> {
        if self.objects.contains_key(&id) {
            return Err(Error::ForeignAlreadyAttached(id));
        }
        self.objects.insert(id, object);
        log::trace!("attached host object to foreign {id:#x}");
        Ok(())
    }

    pub fn get(&self, id: usize) -> Result<Rc<dyn Any>> {
        self.objects
            .get(&id)
            .cloned()
            .ok_or(Error::ForeignNotAttached(id))
    }

    /// Fails for an instance that was never attached or already finalized.
    pub fn detach(&mut self, id: usize) -> Result<Rc<dyn Any>> {
        let object = self.objects.remove(&id).ok_or(Error::ForeignNotAttached(id))?;
        log::trace!("detached host object from foreign {id:#x}");
        Ok(object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Rc<dyn Any>> {
        self.objects.drain().map(|(_, object)| object).collect()
    }
}

/// Module sources lent to the native layer by the load hook. Each one is
/// reclaimed exactly once, by the load-complete hook or at VM teardown.
#[derive(Debug, Default)]
pub struct SourceLedger {
    outstanding: HashSet<usize>,
}

impl SourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, source: CString) -> *const c_char {
        let ptr = source.into_raw();
        self.outstanding.insert(ptr as usize);
        ptr
    }

    pub fn reclaim(&mut self, ptr: *const c_char) -> Result<()> {
        if !self.outstanding.remove(&(ptr as usize)) {
            return Err(Error::UnknownSource(ptr as usize));
        }
        // SAFETY: `ptr` came from `CString::into_raw` in `issue` and was
        // still outstanding
        drop(unsafe { CString::from_raw(ptr as *mut c_char) });
        Ok(())
    }

    /// Frees anything the native layer never handed back.
    pub fn reclaim_all(&mut self) -> usize {
        let leaked: Vec<usize> = self.outstanding.iter().copied().collect();
        for ptr in &leaked {
            // only fails for unknown pointers, and these are all outstanding
            let _ = self.reclaim(*ptr as *const c_char);
        }
        leaked.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

impl Drop for SourceLedger {
    fn drop(&mut self) {
        self.reclaim_all();
    }
}
