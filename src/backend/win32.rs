//! `LoadLibraryW`-family backend for Windows.

use super::{Backend, NativeHandle, SymbolAddress};
use crate::error::{LoaderError, Result};
use std::ffi::{c_void, CString};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use tracing::debug;
use windows::core::{PCSTR, PCWSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{FreeLibrary, GetProcAddress, LoadLibraryW};

#[derive(Debug, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Format a loader failure the way the Win32 last-error code is usually shown.
fn format_error(err: &windows::core::Error) -> String {
    format!("0x{:02x}: {}", err.code().0, err.message())
}

fn to_module(handle: NativeHandle) -> HMODULE {
    HMODULE(handle.as_ptr() as isize)
}

impl Backend for WindowsBackend {
    fn open(&self, library: &str, path: &Path) -> Result<NativeHandle> {
        debug!("LoadLibraryW {}", path.display());
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: `wide` is nul-terminated and outlives the call.
        let module = unsafe { LoadLibraryW(PCWSTR(wide.as_ptr())) }.map_err(|e| {
            LoaderError::OpenFailed {
                library: library.to_string(),
                path: path.to_path_buf(),
                reason: format_error(&e),
            }
        })?;

        NativeHandle::from_raw(module.0 as *mut c_void).ok_or_else(|| LoaderError::OpenFailed {
            library: library.to_string(),
            path: path.to_path_buf(),
            reason: "LoadLibraryW returned a null module".to_string(),
        })
    }

    fn close(&self, library: &str, handle: NativeHandle) -> Result<()> {
        // SAFETY: `handle` came from `open` above and is released exactly once.
        unsafe { FreeLibrary(to_module(handle)) }.map_err(|e| LoaderError::CloseFailed {
            library: library.to_string(),
            reason: format_error(&e),
        })
    }

    fn lookup_symbol(&self, handle: NativeHandle, symbol: &str) -> Option<SymbolAddress> {
        let name = CString::new(symbol).ok()?;
        // SAFETY: `name` is nul-terminated and `handle` is a live module.
        let proc = unsafe { GetProcAddress(to_module(handle), PCSTR(name.as_ptr().cast())) };
        match proc {
            Some(f) => SymbolAddress::from_raw(f as *mut c_void),
            None => {
                debug!("GetProcAddress {} failed", symbol);
                None
            }
        }
    }
}
