//! Catalog snapshot
//!
//! Holds the current catalog model behind an [`ArcSwap`]. Readers take a
//! cheap `Arc<Model>` that stays valid for a whole resolution; a refresh
//! builds and validates a new model and swaps it in wholesale. A refresh that
//! fails leaves the previous snapshot in place.

use crate::error::ControllerError;
use arc_swap::ArcSwap;
use catalog::{CatalogError, DeclarativeConfig, Model};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct CatalogSnapshot {
    path: PathBuf,
    current: ArcSwap<Model>,
}

impl CatalogSnapshot {
    /// Loads and validates the catalog at `path` (a file or a directory).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let path = path.into();
        let model = read(&path)?;
        info!(
            "Loaded catalog from {}: {} package(s)",
            path.display(),
            model.packages().count()
        );
        Ok(Self::from_model(path, model))
    }

    /// Wraps an already built model; `path` is used for later refreshes.
    pub fn from_model(path: impl Into<PathBuf>, model: Model) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(model),
        }
    }

    /// The current model.
    pub fn current(&self) -> Arc<Model> {
        self.current.load_full()
    }

    /// Re-reads the catalog. Returns whether the model changed.
    pub fn refresh(&self) -> Result<bool, ControllerError> {
        let model = read(&self.path)?;
        if *self.current.load_full() == model {
            debug!("Catalog at {} unchanged", self.path.display());
            return Ok(false);
        }
        info!(
            "Catalog at {} changed: {} package(s)",
            self.path.display(),
            model.packages().count()
        );
        self.current.store(Arc::new(model));
        Ok(true)
    }
}

fn read(path: &Path) -> Result<Model, CatalogError> {
    let model = DeclarativeConfig::load(path)?.to_model()?;
    model.validate()?;
    Ok(model)
}
