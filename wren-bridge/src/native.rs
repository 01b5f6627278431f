use core::ffi::{c_char, c_int, c_void};
use std::{
    env,
    path::{Path, PathBuf},
};

use libloading::Library;
use once_cell::sync::OnceCell;

use crate::{
    Error, Result,
    ffi::{WrenConfiguration, WrenHandle, WrenVM},
};

/// Environment variable naming the shared library to load.
pub const LIBRARY_ENV: &str = "WREN_LIBRARY";

static DEFAULT_API: OnceCell<NativeApi> = OnceCell::new();

macro_rules! native_api {
    ($($field:ident = $symbol:literal: fn($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        /// Entry points of the embedded VM, resolved once per library.
        pub struct NativeApi {
            pub(crate) library: Option<Library>,
            $(pub $field: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
        }

        impl NativeApi {
            fn from_library(library: Library) -> Result<Self> {
                $(
                    // SAFETY: the symbol type mirrors the C prototype in the VM header
                    let $field = unsafe {
                        *library
                            .get::<unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                                concat!($symbol, "\0").as_bytes(),
                            )
                            .map_err(|source| Error::MissingSymbol { name: $symbol, source })?
                    };
                )*
                Ok(Self {
                    library: Some(library),
                    $($field,)*
                })
            }
        }
    };
}

native_api! {
    init_configuration = "wrenInitConfiguration": fn(*mut WrenConfiguration);
    new_vm = "wrenNewVM": fn(*mut WrenConfiguration) -> *mut WrenVM;
    free_vm = "wrenFreeVM": fn(*mut WrenVM);
    collect_garbage = "wrenCollectGarbage": fn(*mut WrenVM);
    early_exit = "wrenEarlyExit": fn(*mut WrenVM);
    get_allocated = "wrenGetAllocated": fn(*mut WrenVM) -> usize;
    interpret = "wrenInterpret": fn(*mut WrenVM, *const c_char, *const c_char) -> c_int;
    make_call_handle = "wrenMakeCallHandle": fn(*mut WrenVM, *const c_char) -> *mut WrenHandle;
    call = "wrenCall": fn(*mut WrenVM, *mut WrenHandle) -> c_int;
    release_handle = "wrenReleaseHandle": fn(*mut WrenVM, *mut WrenHandle);
    get_slot_count = "wrenGetSlotCount": fn(*mut WrenVM) -> c_int;
    ensure_slots = "wrenEnsureSlots": fn(*mut WrenVM, c_int);
    get_slot_type = "wrenGetSlotType": fn(*mut WrenVM, c_int) -> c_int;
    get_slot_bool = "wrenGetSlotBool": fn(*mut WrenVM, c_int) -> bool;
    get_slot_bytes = "wrenGetSlotBytes": fn(*mut WrenVM, c_int, *mut c_int) -> *const c_char;
    get_slot_double = "wrenGetSlotDouble": fn(*mut WrenVM, c_int) -> f64;
    get_slot_foreign = "wrenGetSlotForeign": fn(*mut WrenVM, c_int) -> *mut c_void;
    get_slot_handle = "wrenGetSlotHandle": fn(*mut WrenVM, c_int) -> *mut WrenHandle;
    set_slot_bool = "wrenSetSlotBool": fn(*mut WrenVM, c_int, bool);
    set_slot_bytes = "wrenSetSlotBytes": fn(*mut WrenVM, c_int, *const c_char, usize);
    set_slot_double = "wrenSetSlotDouble": fn(*mut WrenVM, c_int, f64);
    set_slot_new_foreign = "wrenSetSlotNewForeign": fn(*mut WrenVM, c_int, c_int, usize) -> *mut c_void;
    set_slot_new_list = "wrenSetSlotNewList": fn(*mut WrenVM, c_int);
    set_slot_new_map = "wrenSetSlotNewMap": fn(*mut WrenVM, c_int);
    set_slot_null = "wrenSetSlotNull": fn(*mut WrenVM, c_int);
    set_slot_handle = "wrenSetSlotHandle": fn(*mut WrenVM, c_int, *mut WrenHandle);
    get_list_count = "wrenGetListCount": fn(*mut WrenVM, c_int) -> c_int;
    get_list_element = "wrenGetListElement": fn(*mut WrenVM, c_int, c_int, c_int);
    set_list_element = "wrenSetListElement": fn(*mut WrenVM, c_int, c_int, c_int);
    insert_in_list = "wrenInsertInList": fn(*mut WrenVM, c_int, c_int, c_int);
    get_map_count = "wrenGetMapCount": fn(*mut WrenVM, c_int) -> c_int;
    get_map_contains_key = "wrenGetMapContainsKey": fn(*mut WrenVM, c_int, c_int) -> bool;
    get_map_value = "wrenGetMapValue": fn(*mut WrenVM, c_int, c_int, c_int);
    set_map_value = "wrenSetMapValue": fn(*mut WrenVM, c_int, c_int, c_int);
    remove_map_value = "wrenRemoveMapValue": fn(*mut WrenVM, c_int, c_int, c_int);
    get_variable = "wrenGetVariable": fn(*mut WrenVM, *const c_char, *const c_char, c_int);
    has_variable = "wrenHasVariable": fn(*mut WrenVM, *const c_char, *const c_char) -> bool;
    has_module = "wrenHasModule": fn(*mut WrenVM, *const c_char) -> bool;
    abort_fiber = "wrenAbortFiber": fn(*mut WrenVM, c_int);
}

impl NativeApi {
    /// Opens the shared library at `path` and resolves every entry point.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initialisers; the VM library has none
        // with preconditions
        let library = unsafe { Library::new(path) }.map_err(|source| Error::Library {
            path: path.to_path_buf(),
            source,
        })?;
        let api = Self::from_library(library)?;
        log::debug!("loaded native VM library from {}", path.display());
        Ok(api)
    }

    /// Gives the table a process lifetime so VMs can borrow it.
    pub fn leak(self) -> &'static NativeApi {
        Box::leak(Box::new(self))
    }

    pub fn is_detached(&self) -> bool {
        self.library.is_none()
    }
}

impl std::fmt::Debug for NativeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeApi")
            .field("library", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

/// `$WREN_LIBRARY` if set, else the platform file name for `wren`.
pub fn default_library_path() -> PathBuf {
    env::var_os(LIBRARY_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(libloading::library_filename("wren")))
}

/// The process-wide table, loaded on first use. A failed load is retried on
/// the next call.
pub fn api() -> Result<&'static NativeApi> {
    DEFAULT_API.get_or_try_init(|| NativeApi::load(default_library_path()))
}
