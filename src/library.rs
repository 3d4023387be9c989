//! A single native library and its load state.
//!
//! A [`Library`] is either unloaded, or loaded with a native handle, the path
//! it was opened from, and a fully bound API. Loading either binds every
//! declared symbol or leaves the library unloaded; there is no partially
//! bound state.

use crate::backend::{Backend, NativeHandle};
use crate::error::{LoaderError, Result};
use crate::path::{self, PathResolver};
use crate::symbols::{self, SymbolBinding, SymbolSchema, SymbolTable};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Point-in-time snapshot of a library's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryInfo {
    pub name: String,
    /// Path the module was opened from; only set while loaded.
    pub path: Option<PathBuf>,
    pub is_loaded: bool,
}

/// Schema-independent view of a library, as held by the registry.
pub trait NativeLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Open the module and bind its symbols. Does nothing if already loaded.
    fn load(&self) -> Result<()>;

    /// Clear the bound symbols and close the module. Does nothing if already
    /// unloaded.
    fn unload(&self) -> Result<()>;

    fn info(&self) -> LibraryInfo;

    fn is_loaded(&self) -> bool {
        self.info().is_loaded
    }
}

struct Loaded<A> {
    path: PathBuf,
    handle: NativeHandle,
    table: SymbolTable,
    api: Arc<A>,
}

enum State<A> {
    Unloaded,
    Loaded(Loaded<A>),
}

/// A native library bound to the API type `A`.
///
/// Load state is guarded by a readers-writer lock. [`Library::with_api`]
/// holds the read side for the duration of a call, so an unload waits for
/// calls made through it to finish. [`Library::api`] hands out the bound API
/// directly; calls made through such a copy must not overlap an unload.
pub struct Library<A> {
    schema: SymbolSchema,
    backend: Arc<dyn Backend>,
    resolver: Arc<RwLock<PathResolver>>,
    state: RwLock<State<A>>,
}

impl<A: SymbolBinding> Library<A> {
    pub fn new(
        schema: SymbolSchema,
        backend: Arc<dyn Backend>,
        resolver: Arc<RwLock<PathResolver>>,
    ) -> Self {
        Self {
            schema,
            backend,
            resolver,
            state: RwLock::new(State::Unloaded),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &SymbolSchema {
        &self.schema
    }

    /// The bound API, if loaded.
    #[must_use]
    pub fn api(&self) -> Option<Arc<A>> {
        match &*self.read_state() {
            State::Loaded(loaded) => Some(Arc::clone(&loaded.api)),
            State::Unloaded => None,
        }
    }

    /// Run `f` against the bound API while holding off unloads.
    ///
    /// Returns `None` without calling `f` if the library is not loaded.
    pub fn with_api<R>(&self, f: impl FnOnce(&A) -> R) -> Option<R> {
        match &*self.read_state() {
            State::Loaded(loaded) => Some(f(&loaded.api)),
            State::Unloaded => None,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State<A>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State<A>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_path(&self) -> PathBuf {
        let resolver = self.resolver.read().unwrap_or_else(PoisonError::into_inner);
        let expanded = resolver.resolve_str(self.name());
        let unknown = path::unresolved_macros(&expanded);
        if !unknown.is_empty() {
            warn!(
                "Library path for {} keeps unknown macros {:?}: {}",
                self.name(),
                unknown,
                expanded
            );
        }
        PathBuf::from(expanded)
    }

    fn bind(&self, handle: NativeHandle) -> Result<(SymbolTable, A)> {
        debug!("Loading symbols...");
        let table = symbols::bind(self.backend.as_ref(), handle, &self.schema)?;
        // SAFETY: every slot was resolved by exact name; the declared shapes
        // are the contract between the API declaration and the module.
        let api = unsafe { A::from_table(&table) }?;
        Ok((table, api))
    }

    /// Load if needed and return the bound API.
    pub fn load_api(&self) -> Result<Arc<A>> {
        self.load_locked(&mut self.write_state())
    }

    fn load_locked(&self, state: &mut State<A>) -> Result<Arc<A>> {
        debug!("Loading library {}", self.name());
        if let State::Loaded(loaded) = state {
            debug!("Load library done, already loaded");
            return Ok(Arc::clone(&loaded.api));
        }

        let path = self.resolve_path();
        let handle = self.backend.open(self.name(), &path)?;
        let (table, api) = self
            .bind(handle)
            .map_err(|e| self.discard(handle, e))?;

        let api = Arc::new(api);
        *state = State::Loaded(Loaded {
            path,
            handle,
            table,
            api: Arc::clone(&api),
        });
        debug!("Load library done.");
        Ok(api)
    }

    /// Close a handle whose bind failed, keeping the bind error as the
    /// reported cause.
    fn discard(&self, handle: NativeHandle, cause: LoaderError) -> LoaderError {
        if let Err(e) = self.backend.close(self.name(), handle) {
            warn!("Failed to close {} after bind failure: {}", self.name(), e);
        }
        cause
    }
}

impl<A: SymbolBinding> NativeLibrary for Library<A> {
    fn name(&self) -> &str {
        self.schema.library()
    }

    fn load(&self) -> Result<()> {
        self.load_locked(&mut self.write_state()).map(|_| ())
    }

    fn unload(&self) -> Result<()> {
        debug!("Unloading library {}", self.name());
        let mut state = self.write_state();
        let Loaded {
            handle, mut table, ..
        } = match std::mem::replace(&mut *state, State::Unloaded) {
            State::Loaded(loaded) => loaded,
            State::Unloaded => {
                debug!("Unload library done, already unloaded.");
                return Ok(());
            }
        };

        debug!("Unloading symbols...");
        symbols::unbind(&mut table);
        self.backend.close(self.name(), handle)?;
        debug!("Unload library done.");
        Ok(())
    }

    fn info(&self) -> LibraryInfo {
        let state = self.read_state();
        let path = match &*state {
            State::Loaded(loaded) => Some(loaded.path.clone()),
            State::Unloaded => None,
        };
        LibraryInfo {
            name: self.name().to_string(),
            is_loaded: path.is_some(),
            path,
        }
    }
}

impl<A> Drop for Library<A> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Loaded(loaded) = std::mem::replace(state, State::Unloaded) {
            let library = self.schema.library();
            debug!("Closing {} on drop", library);
            if let Err(e) = self.backend.close(library, loaded.handle) {
                warn!("Failed to close {} on drop: {}", library, e);
            }
        }
    }
}
