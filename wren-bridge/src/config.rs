use std::{any::Any, rc::Rc};

use crate::{ErrorReport, Result, VM};

/// Body of a foreign method or allocator. Returning `Err` aborts the calling
/// fiber with the error's text.
pub type ForeignMethodFn = Rc<dyn Fn(&VM) -> Result<()>>;

/// Receives the host object detached from a collected foreign instance. The
/// VM is mid-collection, so no VM access is offered.
pub type FinalizerFn = Rc<dyn Fn(Rc<dyn Any>)>;

pub type ResolveModuleFn = Box<dyn Fn(&VM, &str, &str) -> Option<String>>;
pub type LoadModuleFn = Box<dyn Fn(&VM, &str) -> Option<String>>;
pub type BindForeignMethodFn = Box<dyn Fn(&VM, &MethodSignature<'_>) -> Option<ForeignMethodFn>>;
pub type BindForeignClassFn = Box<dyn Fn(&VM, &str, &str) -> ForeignClassMethods>;
pub type WriteFn = Box<dyn Fn(&VM, &str)>;
pub type ErrorFn = Box<dyn Fn(&VM, &ErrorReport)>;

/// What the VM asks the bind hook for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSignature<'a> {
    pub module: &'a str,
    pub class_name: &'a str,
    pub is_static: bool,
    pub signature: &'a str,
}

#[derive(Clone, Default)]
pub struct ForeignClassMethods {
    pub allocate: Option<ForeignMethodFn>,
    pub finalize: Option<FinalizerFn>,
}

impl ForeignClassMethods {
    pub fn new(allocate: ForeignMethodFn, finalize: FinalizerFn) -> Self {
        Self {
            allocate: Some(allocate),
            finalize: Some(finalize),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allocate.is_none() && self.finalize.is_none()
    }
}

/// Host hooks and heap tuning for a VM. Hooks left as `None` stay unset on the
/// native side, so its defaults apply. Immutable once the VM is built.
#[derive(Default)]
pub struct Config {
    pub resolve_module_fn: Option<ResolveModuleFn>,
    pub load_module_fn: Option<LoadModuleFn>,
    pub bind_foreign_method_fn: Option<BindForeignMethodFn>,
    pub bind_foreign_class_fn: Option<BindForeignClassFn>,
    pub write_fn: Option<WriteFn>,
    pub error_fn: Option<ErrorFn>,
    pub initial_heap_size: Option<usize>,
    pub min_heap_size: Option<usize>,
    pub heap_growth_percent: Option<i32>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolve_module(
        mut self,
        f: impl Fn(&VM, &str, &str) -> Option<String> + 'static,
    ) -> Self {
        self.resolve_module_fn = Some(Box::new(f));
        self
    }

    pub fn with_load_module(mut self, f: impl Fn(&VM, &str) -> Option<String> + 'static) -> Self {
        self.load_module_fn = Some(Box::new(f));
        self
    }

    pub fn with_bind_foreign_method(
        mut self,
        f: impl Fn(&VM, &MethodSignature<'_>) -> Option<ForeignMethodFn> + 'static,
    ) -> Self {
        self.bind_foreign_method_fn = Some(Box::new(f));
        self
    }

    pub fn with_bind_foreign_class(
        mut self,
        f: impl Fn(&VM, &str, &str) -> ForeignClassMethods + 'static,
    ) -> Self {
        self.bind_foreign_class_fn = Some(Box::new(f));
        self
    }

    pub fn with_write(mut self, f: impl Fn(&VM, &str) + 'static) -> Self {
        self.write_fn = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&VM, &ErrorReport) + 'static) -> Self {
        self.error_fn = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("resolve_module_fn", &self.resolve_module_fn.is_some())
            .field("load_module_fn", &self.load_module_fn.is_some())
            .field("bind_foreign_method_fn", &self.bind_foreign_method_fn.is_some())
            .field("bind_foreign_class_fn", &self.bind_foreign_class_fn.is_some())
            .field("write_fn", &self.write_fn.is_some())
            .field("error_fn", &self.error_fn.is_some())
            .field("initial_heap_size", &self.initial_heap_size)
            .field("min_heap_size", &self.min_heap_size)
            .field("heap_growth_percent", &self.heap_growth_percent)
            .finish()
    }
}

/// Wraps a closure as a [`ForeignMethodFn`].
pub fn foreign_method(f: impl Fn(&VM) -> Result<()> + 'static) -> ForeignMethodFn {
    Rc::new(f)
}

/// Wraps a closure as a [`FinalizerFn`].
pub fn finalizer(f: impl Fn(Rc<dyn Any>) + 'static) -> FinalizerFn {
    Rc::new(f)
}
