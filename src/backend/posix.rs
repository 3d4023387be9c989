//! `dlopen`-family backend for Linux and macOS.

use super::{Backend, NativeHandle, SymbolAddress};
use crate::error::{LoaderError, Result};
use libloading::os::unix::{Library, RTLD_NOW};
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::path::Path;
use tracing::debug;

/// Opens modules with immediate binding so unresolved imports fail at load
/// time rather than on first call.
#[derive(Debug, Default)]
pub struct PosixBackend;

impl PosixBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Backend for PosixBackend {
    fn open(&self, library: &str, path: &Path) -> Result<NativeHandle> {
        debug!("dlopen {}", path.display());
        // SAFETY: opening a module runs its initialisers; the caller chose the
        // path and accepts that.
        let module = unsafe { Library::open(Some(path), RTLD_NOW) }.map_err(|e| {
            LoaderError::OpenFailed {
                library: library.to_string(),
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        NativeHandle::from_raw(module.into_raw()).ok_or_else(|| LoaderError::OpenFailed {
            library: library.to_string(),
            path: path.to_path_buf(),
            reason: "dlopen returned a null handle".to_string(),
        })
    }

    fn close(&self, library: &str, handle: NativeHandle) -> Result<()> {
        // SAFETY: `handle` came from `open` above and is closed exactly once.
        let module = unsafe { Library::from_raw(handle.as_ptr()) };
        module.close().map_err(|e| LoaderError::CloseFailed {
            library: library.to_string(),
            reason: e.to_string(),
        })
    }

    fn lookup_symbol(&self, handle: NativeHandle, symbol: &str) -> Option<SymbolAddress> {
        // Borrow the handle without taking over its close.
        // SAFETY: `handle` is a live handle produced by `open`.
        let module = ManuallyDrop::new(unsafe { Library::from_raw(handle.as_ptr()) });
        // SAFETY: the address is only read, never called, here.
        let found = unsafe { module.get::<*mut c_void>(symbol.as_bytes()) };
        match found {
            Ok(sym) => SymbolAddress::from_raw(sym.into_raw()),
            Err(e) => {
                debug!("dlsym {} failed: {}", symbol, e);
                None
            }
        }
    }
}
