//! Host lifecycle adapter
//!
//! Maps the host's enable / resume / pause / shutdown events onto registry
//! operations. The host owns the events; this type only decides what each one
//! does to the loaded libraries.

use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::registry::{BatchReport, Registry};
use std::sync::Arc;
use tracing::{debug, info};

/// Drives a [`Registry`] from host lifecycle events.
pub struct LifecycleHooks {
    registry: Arc<Registry>,
    config: LifecycleConfig,
}

impl LifecycleHooks {
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: LifecycleConfig) -> Self {
        Self { registry, config }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Host enabled the loader.
    ///
    /// When `library_path` differs from the current pattern every library is
    /// unloaded and the new pattern takes effect before loading.
    pub fn on_enable(&self, library_path: Option<&str>) -> Result<Option<BatchReport>> {
        info!("OnEnable: {}", library_path.unwrap_or("<unchanged>"));
        if let Some(pattern) = library_path {
            self.registry.set_path_pattern(pattern)?;
        }
        self.load_if_enabled()
    }

    /// Host resumed after a pause.
    pub fn on_resume(&self) -> Result<Option<BatchReport>> {
        debug!("OnResume");
        self.load_if_enabled()
    }

    /// Host paused. Libraries are only unloaded when configured to.
    pub fn on_pause(&self) -> Result<Option<BatchReport>> {
        debug!("OnPause");
        if self.config.unload_on_pause {
            self.registry.unload_all().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Host is shutting down; every library is unloaded.
    pub fn on_shutdown(&self) -> Result<BatchReport> {
        info!("OnShutdown");
        self.registry.unload_all()
    }

    fn load_if_enabled(&self) -> Result<Option<BatchReport>> {
        if self.config.load_on_enable {
            self.registry.load_all().map(Some)
        } else {
            Ok(None)
        }
    }
}
