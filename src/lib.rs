//! Shine Loader - cross-platform native library loading
//!
//! This library resolves native module paths from a pattern, opens them with
//! the platform loader, and binds a declared set of C entry points into a
//! typed API struct.
//!
//! # Modules
//!
//! - [`path`]: Path pattern expansion (`{name}`, `{assets}`, `{project}`, `{devel}`)
//! - [`backend`]: Platform loader backends (`dlopen` / `LoadLibraryW`)
//! - [`symbols`]: Symbol schemas, binding, and the [`native_api!`] macro
//! - [`library`]: A single library and its load state
//! - [`registry`]: All libraries of the host, keyed by name
//! - [`lifecycle`]: Host lifecycle events mapped onto the registry
//! - [`config`]: Loader configuration file
//! - [`mesh`]: The `shine` mesh API
//!
//! # Example
//!
//! ```rust,ignore
//! use shine_loader::{mesh::{Mesh, MeshApi}, LoaderConfig, Registry};
//!
//! let registry = Registry::from_config(&LoaderConfig::load_default()?)?;
//! let api = registry.load_native_library::<MeshApi>()?;
//! // SAFETY: the library stays loaded until the mesh is dropped.
//! if let Some(mesh) = unsafe { Mesh::new(api) } {
//!     println!("{:?}", mesh.info());
//! }
//! registry.unload_all()?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod library;
pub mod lifecycle;
pub mod mesh;
pub mod path;
pub mod registry;
pub mod symbols;

pub use backend::{Backend, NativeHandle, Platform, SymbolAddress};
pub use config::{LifecycleConfig, LoaderConfig};
pub use error::{BatchError, BatchOperation, LoaderError, Result};
pub use library::{Library, LibraryInfo, NativeLibrary};
pub use lifecycle::LifecycleHooks;
pub use path::PathResolver;
pub use registry::{BatchReport, Registry};
pub use symbols::{NativeApi, SymbolBinding, SymbolSchema, SymbolSlot, SymbolTable};
