//! Active model handle
//!
//! Readers clone an `Arc` under a short read lock and score with it; a
//! promotion swaps the pointer under the write lock. In-flight predictions
//! keep the model they started with, and no reader ever sees a half-loaded
//! model.

use crate::model::YieldModel;
use std::sync::{Arc, PoisonError, RwLock};

/// Source of the model currently serving predictions.
pub trait ModelProvider: Send + Sync {
    /// The serving model, or `None` before the first promotion
    fn current(&self) -> Option<Arc<dyn YieldModel>>;
}

/// Swappable holder of the active model.
#[derive(Default)]
pub struct ModelRegistry {
    active: RwLock<Option<Arc<dyn YieldModel>>>,
}

impl ModelRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry already serving `model`
    #[must_use]
    pub fn with_model(model: Arc<dyn YieldModel>) -> Self {
        Self {
            active: RwLock::new(Some(model)),
        }
    }

    /// Replace the active model, returning the previous one.
    pub fn swap(&self, model: Arc<dyn YieldModel>) -> Option<Arc<dyn YieldModel>> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(version = %model.version(), "active model swapped");
        active.replace(model)
    }

    /// Stop serving any model.
    pub fn clear(&self) -> Option<Arc<dyn YieldModel>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl ModelProvider for ModelRegistry {
    fn current(&self) -> Option<Arc<dyn YieldModel>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
