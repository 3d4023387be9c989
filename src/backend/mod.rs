//! Platform loader backends.
//!
//! A backend is the primitive open / close / lookup triple of the operating
//! system's dynamic loader. One implementation exists per platform family and
//! is chosen once, when the registry is built:
//!
//! - **Windows**: `LoadLibraryW` / `FreeLibrary` / `GetProcAddress`
//! - **Linux/macOS**: `dlopen(RTLD_NOW)` / `dlclose` / `dlsym`
//!
//! Symbol names are passed to the loader verbatim; nothing is mangled or
//! decorated here.

use crate::error::{LoaderError, Result};
use std::ffi::c_void;
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod win32;

#[cfg(unix)]
pub use posix::PosixBackend;
#[cfg(windows)]
pub use win32::WindowsBackend;

/// Opaque handle to a module opened by a [`Backend`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonNull<c_void>);

// SAFETY: module handles are process-wide values owned by the OS loader;
// they carry no thread affinity.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    /// Wrap a raw loader handle; `None` if it is null.
    #[must_use]
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:p})", self.0)
    }
}

/// Address of an exported symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(NonNull<c_void>);

// SAFETY: an exported address is plain data; using it is what needs care.
unsafe impl Send for SymbolAddress {}
unsafe impl Sync for SymbolAddress {}

impl SymbolAddress {
    /// Wrap a raw symbol address; `None` if it is null.
    #[must_use]
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

/// The primitive operations of a platform's dynamic loader.
pub trait Backend: Send + Sync {
    /// Open the module at `path` on behalf of `library`.
    fn open(&self, library: &str, path: &Path) -> Result<NativeHandle>;

    /// Release a handle previously returned by [`Backend::open`].
    fn close(&self, library: &str, handle: NativeHandle) -> Result<()>;

    /// Look up an exported symbol by its exact C name.
    fn lookup_symbol(&self, handle: NativeHandle, symbol: &str) -> Option<SymbolAddress>;
}

/// Loader families with a backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    /// Detect the loader family of the running platform.
    pub fn detect() -> Result<Self> {
        #[cfg(windows)]
        {
            Ok(Platform::Windows)
        }
        #[cfg(unix)]
        {
            Ok(Platform::Posix)
        }
        #[cfg(not(any(windows, unix)))]
        {
            Err(LoaderError::PlatformUnsupported {
                platform: std::env::consts::OS.to_string(),
            })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Posix => "posix",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backend for the given loader family.
///
/// Fails with [`LoaderError::PlatformUnsupported`] when the family is not the
/// one this binary was built for.
pub fn backend_for(platform: Platform) -> Result<Arc<dyn Backend>> {
    match platform {
        #[cfg(windows)]
        Platform::Windows => Ok(Arc::new(WindowsBackend::new())),
        #[cfg(unix)]
        Platform::Posix => Ok(Arc::new(PosixBackend::new())),
        #[allow(unreachable_patterns)]
        other => Err(LoaderError::PlatformUnsupported {
            platform: format!("{other} on {}", std::env::consts::OS),
        }),
    }
}

/// Backend for the running platform.
pub fn native_backend() -> Result<Arc<dyn Backend>> {
    backend_for(Platform::detect()?)
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory loader used by unit tests.

    use super::{Backend, NativeHandle, SymbolAddress};
    use crate::error::{LoaderError, Result};
    use std::collections::HashMap;
    use std::ffi::c_void;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        modules: HashMap<PathBuf, Vec<&'static str>>,
        open: HashMap<usize, PathBuf>,
        next: usize,
        opens: usize,
        closes: usize,
        fail_close: bool,
    }

    /// Serves modules registered by path; symbol addresses are synthetic.
    #[derive(Default)]
    pub struct FakeBackend {
        state: Mutex<State>,
    }

    impl FakeBackend {
        pub fn with_module(self, path: impl Into<PathBuf>, symbols: &[&'static str]) -> Self {
            self.state
                .lock()
                .unwrap()
                .modules
                .insert(path.into(), symbols.to_vec());
            self
        }

        pub fn fail_close(&self, fail: bool) {
            self.state.lock().unwrap().fail_close = fail;
        }

        pub fn open_count(&self) -> usize {
            self.state.lock().unwrap().open.len()
        }

        pub fn opens(&self) -> usize {
            self.state.lock().unwrap().opens
        }

        pub fn closes(&self) -> usize {
            self.state.lock().unwrap().closes
        }
    }

    impl Backend for FakeBackend {
        fn open(&self, library: &str, path: &Path) -> Result<NativeHandle> {
            let mut state = self.state.lock().unwrap();
            if !state.modules.contains_key(path) {
                return Err(LoaderError::OpenFailed {
                    library: library.to_string(),
                    path: path.to_path_buf(),
                    reason: "no such module".into(),
                });
            }
            state.next += 1;
            state.opens += 1;
            let id = state.next;
            state.open.insert(id, path.to_path_buf());
            Ok(NativeHandle::from_raw((id * 0x1000) as *mut c_void).unwrap())
        }

        fn close(&self, library: &str, handle: NativeHandle) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.closes += 1;
            state.open.remove(&(handle.as_ptr() as usize / 0x1000));
            if state.fail_close {
                return Err(LoaderError::CloseFailed {
                    library: library.to_string(),
                    reason: "refused".into(),
                });
            }
            Ok(())
        }

        fn lookup_symbol(&self, handle: NativeHandle, symbol: &str) -> Option<SymbolAddress> {
            let state = self.state.lock().unwrap();
            let id = handle.as_ptr() as usize / 0x1000;
            let path = state.open.get(&id)?;
            let index = state.modules.get(path)?.iter().position(|s| *s == symbol)?;
            SymbolAddress::from_raw((handle.as_ptr() as usize + 0x10 * (index + 1)) as *mut c_void)
        }
    }
}
