//! Registry of native libraries keyed by logical name.
//!
//! The registry is the single owner of every [`Library`] the host uses. It is
//! safe to load and unload libraries from any thread; using a library's raw
//! API while it is being unloaded is not (see [`Library`]).
//!
//! Locking: the name map sits behind one mutex, held for get-or-create and
//! while taking membership snapshots. Each library guards its own load state,
//! so loading one library does not block lookups of another.

use crate::backend::{self, Backend};
use crate::config::LoaderConfig;
use crate::error::{BatchError, BatchOperation, LoaderError, Result};
use crate::library::{Library, LibraryInfo, NativeLibrary};
use crate::path::PathResolver;
use crate::symbols::{NativeApi, SymbolBinding, SymbolSchema, SymbolTable};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

struct Entry {
    library: Arc<dyn NativeLibrary>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Outcome of a successful `load_all` / `unload_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub operation: BatchOperation,
    /// Every library the operation was attempted on.
    pub libraries: Vec<String>,
}

/// Owns every native library used by the host.
pub struct Registry {
    backend: Arc<dyn Backend>,
    resolver: Arc<RwLock<PathResolver>>,
    libraries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    /// Registry for the running platform.
    ///
    /// Fails with [`LoaderError::PlatformUnsupported`] when no backend exists
    /// for this platform.
    pub fn new(resolver: PathResolver) -> Result<Self> {
        Ok(Self::with_backend(backend::native_backend()?, resolver))
    }

    /// Registry for the running platform, configured from `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        Self::new(config.resolver())
    }

    /// Registry using an explicit backend.
    pub fn with_backend(backend: Arc<dyn Backend>, resolver: PathResolver) -> Self {
        Self {
            backend,
            resolver: Arc::new(RwLock::new(resolver)),
            libraries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<Arc<dyn NativeLibrary>> {
        self.lock()
            .values()
            .map(|entry| Arc::clone(&entry.library))
            .collect()
    }

    /// The library declared by `A`, created unloaded if not yet registered.
    pub fn library<A: NativeApi>(&self) -> Result<Arc<Library<A>>> {
        self.get_or_create(SymbolSchema::of::<A>())
    }

    /// A library for a schema built at runtime. Its API is the bound
    /// [`SymbolTable`] itself.
    pub fn dynamic_library(&self, schema: SymbolSchema) -> Result<Arc<Library<SymbolTable>>> {
        self.get_or_create(schema)
    }

    fn get_or_create<A: SymbolBinding>(&self, schema: SymbolSchema) -> Result<Arc<Library<A>>> {
        if schema.library().is_empty() {
            return Err(LoaderError::EmptyLibraryName);
        }

        let mut libraries = self.lock();
        if let Some(entry) = libraries.get(schema.library()) {
            let duplicate = || LoaderError::DuplicateRegistration {
                library: schema.library().to_string(),
            };
            let library = Arc::clone(&entry.typed)
                .downcast::<Library<A>>()
                .map_err(|_| duplicate())?;
            if library.schema() != &schema {
                return Err(duplicate());
            }
            return Ok(library);
        }

        let name = schema.library().to_string();
        debug!("Registering library {}", name);
        let library = Arc::new(Library::<A>::new(
            schema,
            Arc::clone(&self.backend),
            Arc::clone(&self.resolver),
        ));
        libraries.insert(
            name,
            Entry {
                library: library.clone(),
                typed: library.clone(),
            },
        );
        Ok(library)
    }

    /// Register and load the library declared by `A`, returning its API.
    pub fn load_native_library<A: NativeApi>(&self) -> Result<Arc<A>> {
        self.library::<A>()?.load_api()
    }

    /// Load every registered library, attempting all of them.
    pub fn load_all(&self) -> Result<BatchReport> {
        info!("Loading all libraries...");
        let report = self.run_batch(BatchOperation::Load, |lib| lib.load());
        info!("Loading all libraries done.");
        report
    }

    /// Unload every registered library, attempting all of them.
    pub fn unload_all(&self) -> Result<BatchReport> {
        info!("Unloading all libraries...");
        let report = self.run_batch(BatchOperation::Unload, |lib| lib.unload());
        info!("Unloading all libraries done.");
        report
    }

    fn run_batch(
        &self,
        operation: BatchOperation,
        op: impl Fn(&dyn NativeLibrary) -> Result<()>,
    ) -> Result<BatchReport> {
        let libraries = self.snapshot();
        let mut names = Vec::with_capacity(libraries.len());
        let mut failures = Vec::new();
        for library in &libraries {
            let name = library.name().to_string();
            if let Err(e) = op(library.as_ref()) {
                warn!("Failed to {} {}: {}", operation, name, e);
                failures.push((name.clone(), e));
            }
            names.push(name);
        }

        if failures.is_empty() {
            Ok(BatchReport {
                operation,
                libraries: names,
            })
        } else {
            Err(BatchError {
                operation,
                attempted: names.len(),
                failures,
            }
            .into())
        }
    }

    /// Snapshot of every registered library.
    pub fn info(&self) -> Vec<LibraryInfo> {
        self.snapshot().iter().map(|lib| lib.info()).collect()
    }

    /// Whether any registered library satisfies `pred`.
    ///
    /// `pred` runs on a snapshot and may call back into the registry.
    pub fn any(&self, pred: impl Fn(&dyn NativeLibrary) -> bool) -> bool {
        self.snapshot().iter().any(|lib| pred(lib.as_ref()))
    }

    /// Call `f` on every registered library.
    pub fn for_each(&self, mut f: impl FnMut(&dyn NativeLibrary)) {
        for library in self.snapshot() {
            f(library.as_ref());
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn path_pattern(&self) -> String {
        self.resolver
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pattern()
            .to_string()
    }

    /// Replace the path pattern used for future loads.
    ///
    /// The new pattern is installed before every library is unloaded, so any
    /// load racing this call resolves against the new pattern and nothing
    /// stays loaded from a path the new pattern no longer names. Returns
    /// whether the pattern changed.
    pub fn set_path_pattern(&self, pattern: &str) -> Result<bool> {
        {
            let mut resolver = self.resolver.write().unwrap_or_else(PoisonError::into_inner);
            if resolver.pattern() == pattern {
                return Ok(false);
            }
            resolver.set_pattern(pattern);
        }
        info!("Library path pattern changed to {}", pattern);
        self.unload_all().map(|_| true)
    }

    /// Unload every library and forget all registrations.
    pub fn clear(&self) -> Result<BatchReport> {
        let report = self.unload_all();
        self.lock().clear();
        report
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("pattern", &self.path_pattern())
            .field("libraries", &self.info())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use std::sync::{OnceLock, Weak};

    crate::native_api! {
        struct MeshApi in "shine" {
            create_mesh: unsafe extern "C" fn() -> *mut std::ffi::c_void,
            release_mesh: unsafe extern "C" fn(*mut std::ffi::c_void),
        }
    }

    crate::native_api! {
        struct OtherApi in "shine" {
            create_mesh: unsafe extern "C" fn() -> *mut std::ffi::c_void,
        }
    }

    fn registry(backend: &Arc<FakeBackend>) -> Registry {
        let backend: Arc<dyn Backend> = backend.clone();
        Registry::with_backend(backend, PathResolver::new("/lib/{name}.so", "", "", ""))
    }

    #[test]
    fn test_get_or_create_returns_same_library() {
        let reg = registry(&Arc::new(FakeBackend::default()));
        let a = reg.library::<MeshApi>().unwrap();
        let b = reg.library::<MeshApi>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert!(!a.is_loaded());
    }

    #[test]
    fn test_conflicting_schema_is_rejected() {
        let reg = registry(&Arc::new(FakeBackend::default()));
        reg.library::<MeshApi>().unwrap();
        assert!(matches!(
            reg.library::<OtherApi>(),
            Err(LoaderError::DuplicateRegistration { .. })
        ));
    }

    #[test]
    fn test_load_native_library() {
        let backend = Arc::new(
            FakeBackend::default().with_module("/lib/shine.so", &["create_mesh", "release_mesh"]),
        );
        let reg = registry(&backend);
        assert!(reg.load_native_library::<MeshApi>().is_ok());
        assert!(reg.any(|lib| lib.is_loaded()));
        assert_eq!(reg.info()[0].name, "shine");
    }

    #[test]
    fn test_unload_all_empty_registry() {
        let reg = registry(&Arc::new(FakeBackend::default()));
        let report = reg.unload_all().unwrap();
        assert_eq!(report.operation, BatchOperation::Unload);
        assert!(report.libraries.is_empty());
        assert!(!reg.any(|_| true));
    }

    #[test]
    fn test_set_path_pattern_unloads() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_module("/lib/shine.so", &["create_mesh", "release_mesh"])
                .with_module("/other/shine.so", &["create_mesh", "release_mesh"]),
        );
        let reg = registry(&backend);
        reg.load_native_library::<MeshApi>().unwrap();
        assert!(!reg.set_path_pattern("/lib/{name}.so").unwrap());
        assert!(reg.set_path_pattern("/other/{name}.so").unwrap());
        assert!(!reg.any(|lib| lib.is_loaded()));
        reg.load_all().unwrap();
        assert_eq!(
            reg.info()[0].path.as_deref(),
            Some(std::path::Path::new("/other/shine.so"))
        );
    }

    #[test]
    fn test_any_predicate_may_reenter_registry() {
        let backend = Arc::new(
            FakeBackend::default().with_module("/lib/shine.so", &["create_mesh", "release_mesh"]),
        );
        let reg = registry(&backend);
        reg.load_native_library::<MeshApi>().unwrap();
        assert!(reg.any(|lib| reg.len() == 1 && reg.info()[0].name == lib.name()));
        assert!(reg.any(|_| reg.library::<MeshApi>().is_ok()));
    }

    #[test]
    fn test_runtime_schema_mismatch_is_rejected() {
        let reg = registry(&Arc::new(FakeBackend::default()));
        let first = reg.dynamic_library(SymbolSchema::new("lib", ["a"])).unwrap();
        let again = reg.dynamic_library(SymbolSchema::new("lib", ["a"])).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        match reg.dynamic_library(SymbolSchema::new("lib", ["b"])) {
            Err(LoaderError::DuplicateRegistration { library }) => assert_eq!(library, "lib"),
            Err(other) => panic!("expected DuplicateRegistration, got {other}"),
            Ok(_) => panic!("expected DuplicateRegistration"),
        }
        assert_eq!(first.schema().symbols(), ["a"]);
    }

    #[test]
    fn test_empty_library_name_is_rejected() {
        let reg = registry(&Arc::new(FakeBackend::default()));
        assert!(matches!(
            reg.dynamic_library(SymbolSchema::new("", ["a"])),
            Err(LoaderError::EmptyLibraryName)
        ));
        assert!(reg.is_empty());
    }

    /// Records the registry's pattern each time a module is closed.
    struct PatternAtClose {
        inner: FakeBackend,
        registry: OnceLock<Weak<Registry>>,
        seen: Mutex<Vec<String>>,
    }

    impl Backend for PatternAtClose {
        fn open(&self, library: &str, path: &std::path::Path) -> Result<crate::NativeHandle> {
            self.inner.open(library, path)
        }

        fn close(&self, library: &str, handle: crate::NativeHandle) -> Result<()> {
            if let Some(reg) = self.registry.get().and_then(Weak::upgrade) {
                self.seen.lock().unwrap().push(reg.path_pattern());
            }
            self.inner.close(library, handle)
        }

        fn lookup_symbol(
            &self,
            handle: crate::NativeHandle,
            symbol: &str,
        ) -> Option<crate::SymbolAddress> {
            self.inner.lookup_symbol(handle, symbol)
        }
    }

    #[test]
    fn test_set_path_pattern_installs_pattern_before_unloading() {
        let backend = Arc::new(PatternAtClose {
            inner: FakeBackend::default()
                .with_module("/lib/shine.so", &["create_mesh", "release_mesh"]),
            registry: OnceLock::new(),
            seen: Mutex::new(Vec::new()),
        });
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let reg = Arc::new(Registry::with_backend(
            dyn_backend,
            PathResolver::new("/lib/{name}.so", "", "", ""),
        ));
        backend.registry.set(Arc::downgrade(&reg)).unwrap();

        reg.load_native_library::<MeshApi>().unwrap();
        assert!(reg.set_path_pattern("/other/{name}.so").unwrap());
        assert_eq!(*backend.seen.lock().unwrap(), vec!["/other/{name}.so".to_string()]);
        assert!(!reg.any(|lib| lib.is_loaded()));
    }

    #[test]
    fn test_clear_drops_registrations() {
        let backend = Arc::new(
            FakeBackend::default().with_module("/lib/shine.so", &["create_mesh", "release_mesh"]),
        );
        let reg = registry(&backend);
        reg.load_native_library::<MeshApi>().unwrap();
        reg.clear().unwrap();
        assert!(reg.is_empty());
        assert_eq!(backend.open_count(), 0);
    }
}
