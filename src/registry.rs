// src/registry.rs

use crate::classify::SctldClassifier;
use crate::detect::CoralDetector;
use crate::error::Result;
use crate::types::Config;
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

/// A matched detector/classifier pair, loaded together.
///
/// The adapters take `&mut self` to run inference, so each sits behind its
/// own `Mutex`; a request locks them for the duration of one frame.
pub struct ModelSet {
    pub detector: Mutex<CoralDetector>,
    pub classifier: Mutex<SctldClassifier>,
}

impl ModelSet {
    pub fn load(config: &Config) -> Result<Self> {
        let detector = CoralDetector::new(
            &config.model,
            &config.inference,
            config.detection.nms_iou_threshold,
        )?;
        let classifier = SctldClassifier::new(&config.model, &config.inference)?;
        Ok(Self {
            detector: Mutex::new(detector),
            classifier: Mutex::new(classifier),
        })
    }
}

/// Injectable holder for the current model set.
///
/// Reload builds a complete new `ModelSet` first and then swaps the held
/// reference under a single write; requests already running keep their
/// `Arc` to the old set until they finish. The set is never mutated in
/// place.
pub struct ModelRegistry {
    slot: RwLock<Arc<ModelSet>>,
}

impl ModelRegistry {
    pub fn new(set: ModelSet) -> Self {
        Self {
            slot: RwLock::new(Arc::new(set)),
        }
    }

    pub fn load(config: &Config) -> Result<Self> {
        Ok(Self::new(ModelSet::load(config)?))
    }

    /// The model set to use for one request.
    pub fn current(&self) -> Arc<ModelSet> {
        // The slot only ever holds a complete Arc, so a reader surviving a
        // poisoned lock still sees a coherent set.
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn swap(&self, set: ModelSet) {
        let set = Arc::new(set);
        match self.slot.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
        info!("✓ Model set swapped");
    }

    /// Load fresh models from `config` and hand them off atomically. On
    /// failure the registry keeps serving the previous set.
    pub fn reload(&self, config: &Config) -> Result<()> {
        let set = ModelSet::load(config)?;
        self.swap(set);
        Ok(())
    }
}
