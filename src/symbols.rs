//! Symbol schemas and binding.
//!
//! A schema is the list of entry points a native module must export. Binding
//! resolves every slot through a [`Backend`] and produces an immutable
//! [`SymbolTable`]; typed APIs are then built from the table in one step.
//!
//! Schemas are usually declared with [`native_api!`](crate::native_api),
//! which generates a struct of `extern "C"` function pointers whose field
//! names are the exported symbol names:
//!
//! ```rust,ignore
//! shine_loader::native_api! {
//!     pub struct MathApi in "mathlib" {
//!         add: unsafe extern "C" fn(i32, i32) -> i32,
//!         negate: unsafe extern "C" fn(i32) -> i32,
//!     }
//! }
//! ```

use crate::backend::{Backend, NativeHandle, SymbolAddress};
use crate::error::{LoaderError, Result};
use tracing::debug;

/// One declared entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolSlot {
    /// Exact exported C name.
    pub name: &'static str,
    /// Function-pointer shape, for diagnostics only.
    pub shape: &'static str,
}

impl SymbolSlot {
    #[must_use]
    pub const fn new(name: &'static str, shape: &'static str) -> Self {
        Self { name, shape }
    }
}

/// The entry points a library is expected to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSchema {
    library: String,
    symbols: Vec<String>,
}

impl SymbolSchema {
    #[must_use]
    pub fn new<I, S>(library: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            library: library.into(),
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Schema of a compile-time declared API.
    #[must_use]
    pub fn of<A: NativeApi>() -> Self {
        Self::new(A::LIBRARY_NAME, A::SYMBOLS.iter().map(|slot| slot.name))
    }

    #[must_use]
    pub fn library(&self) -> &str {
        &self.library
    }

    #[must_use]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

/// Resolved addresses for every slot of a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    library: String,
    entries: Vec<(String, SymbolAddress)>,
}

impl SymbolTable {
    #[must_use]
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Address bound to `symbol`, if any.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SymbolAddress> {
        self.entries
            .iter()
            .find(|(name, _)| name == symbol)
            .map(|(_, addr)| *addr)
    }

    /// Address bound to `symbol`, or [`LoaderError::MissingSymbol`].
    pub fn require(&self, symbol: &str) -> Result<SymbolAddress> {
        self.get(symbol).ok_or_else(|| LoaderError::MissingSymbol {
            library: self.library.clone(),
            symbol: symbol.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SymbolAddress)> {
        self.entries.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve every symbol of `schema` from `handle`.
///
/// Stops at the first symbol the module does not export; no table is
/// produced in that case.
pub fn bind(backend: &dyn Backend, handle: NativeHandle, schema: &SymbolSchema) -> Result<SymbolTable> {
    let mut entries = Vec::with_capacity(schema.symbols.len());
    for symbol in &schema.symbols {
        debug!("Loading symbol {} from {}", symbol, schema.library);
        let addr = backend
            .lookup_symbol(handle, symbol)
            .ok_or_else(|| LoaderError::MissingSymbol {
                library: schema.library.clone(),
                symbol: symbol.clone(),
            })?;
        entries.push((symbol.clone(), addr));
    }
    Ok(SymbolTable {
        library: schema.library.clone(),
        entries,
    })
}

/// Clear every slot of `table`. Clearing an empty table does nothing.
pub fn unbind(table: &mut SymbolTable) {
    for (symbol, _) in &table.entries {
        debug!("Unloading symbol {} from {}", symbol, table.library);
    }
    table.entries.clear();
}

/// A value that can be built from a bound symbol table.
pub trait SymbolBinding: Sized + Send + Sync + 'static {
    /// Build the value from `table`.
    ///
    /// # Safety
    /// Every address the implementation reads from `table` must point at a
    /// function with the shape the implementation assumes.
    unsafe fn from_table(table: &SymbolTable) -> Result<Self>;
}

impl SymbolBinding for SymbolTable {
    unsafe fn from_table(table: &SymbolTable) -> Result<Self> {
        Ok(table.clone())
    }
}

/// A compile-time declared native API.
pub trait NativeApi: SymbolBinding {
    /// Logical name the library is registered and resolved under.
    const LIBRARY_NAME: &'static str;
    /// Entry points the library must export.
    const SYMBOLS: &'static [SymbolSlot];
}

/// Declare a native API as a struct of C function pointers.
///
/// Each field name is the exported symbol it binds to. The generated type
/// implements [`NativeApi`] and can be requested from a
/// [`Registry`](crate::Registry).
#[macro_export]
macro_rules! native_api {
    (
        $(#[$meta:meta])*
        $vis:vis struct $api:ident in $library:literal {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $fnty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        $vis struct $api {
            $(
                $(#[$field_meta])*
                pub $field: $fnty,
            )*
        }

        impl $crate::symbols::SymbolBinding for $api {
            unsafe fn from_table(
                table: &$crate::symbols::SymbolTable,
            ) -> ::std::result::Result<Self, $crate::LoaderError> {
                Ok(Self {
                    $(
                        // SAFETY: the declared shape is the caller's contract
                        // with the native module.
                        $field: unsafe {
                            ::std::mem::transmute::<*mut ::std::ffi::c_void, $fnty>(
                                table.require(stringify!($field))?.as_ptr(),
                            )
                        },
                    )*
                })
            }
        }

        impl $crate::symbols::NativeApi for $api {
            const LIBRARY_NAME: &'static str = $library;
            const SYMBOLS: &'static [$crate::symbols::SymbolSlot] = &[
                $( $crate::symbols::SymbolSlot::new(stringify!($field), stringify!($fnty)), )*
            ];
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use std::path::Path;

    crate::native_api! {
        struct CounterApi in "counter" {
            counter_new: unsafe extern "C" fn() -> i32,
            counter_add: unsafe extern "C" fn(i32, i32) -> i32,
        }
    }

    #[test]
    fn test_schema_from_declared_api() {
        let schema = SymbolSchema::of::<CounterApi>();
        assert_eq!(schema.library(), "counter");
        assert_eq!(schema.symbols(), ["counter_new", "counter_add"]);
        assert_eq!(
            CounterApi::SYMBOLS[1].shape,
            "unsafe extern \"C\" fn(i32, i32) -> i32"
        );
    }

    #[test]
    fn test_bind_resolves_every_slot() {
        let backend = FakeBackend::default().with_module("c.so", &["counter_add", "counter_new"]);
        let handle = backend.open("counter", Path::new("c.so")).unwrap();
        let table = bind(&backend, handle, &SymbolSchema::of::<CounterApi>()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("counter_new").is_some());
        assert!(table.require("counter_add").is_ok());
        assert!(unsafe { CounterApi::from_table(&table) }.is_ok());
    }

    #[test]
    fn test_bind_fails_on_missing_symbol() {
        let backend = FakeBackend::default().with_module("c.so", &["counter_new"]);
        let handle = backend.open("counter", Path::new("c.so")).unwrap();
        let err = bind(&backend, handle, &SymbolSchema::of::<CounterApi>()).unwrap_err();
        match err {
            LoaderError::MissingSymbol { library, symbol } => {
                assert_eq!(library, "counter");
                assert_eq!(symbol, "counter_add");
            }
            other => panic!("expected MissingSymbol, got {other}"),
        }
    }

    #[test]
    fn test_symbol_names_are_case_sensitive() {
        let backend = FakeBackend::default().with_module("c.so", &["Counter_New", "counter_add"]);
        let handle = backend.open("counter", Path::new("c.so")).unwrap();
        assert!(bind(&backend, handle, &SymbolSchema::of::<CounterApi>()).is_err());
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let backend = FakeBackend::default().with_module("c.so", &["counter_new", "counter_add"]);
        let handle = backend.open("counter", Path::new("c.so")).unwrap();
        let mut table = bind(&backend, handle, &SymbolSchema::of::<CounterApi>()).unwrap();
        unbind(&mut table);
        assert!(table.is_empty());
        unbind(&mut table);
        assert!(table.is_empty());
        assert!(table.require("counter_new").is_err());
    }

    #[test]
    fn test_from_table_on_cleared_table_fails() {
        let table = SymbolTable::default();
        assert!(unsafe { CounterApi::from_table(&table) }.is_err());
    }
}
