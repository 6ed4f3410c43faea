//! Builders wiring configuration into schedulers and admission gates.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::audit::AuditSink;
use crate::core::classify::{Classify, DefaultClassifier};
use crate::core::error::AdmissionError;
use crate::core::scheduler::{Scheduler, Spawn};
use crate::runtime::adapter::AdmissionGate;
use crate::runtime::tokio_spawner::TokioSpawner;

/// Assembles a [`Scheduler`] or [`AdmissionGate`] from parts, resolving a
/// spawner from the ambient tokio runtime when none is supplied.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    spawner: Option<Arc<dyn Spawn>>,
    audit: Option<Box<dyn AuditSink>>,
    classifier: Option<Arc<dyn Classify>>,
}

impl SchedulerBuilder {
    /// Start from configuration; everything else has defaults.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            spawner: None,
            audit: None,
            classifier: None,
        }
    }

    /// Spawn pumps and timers with this instead of the ambient runtime.
    pub fn spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Record admission decisions to the given sink.
    pub fn audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Classify with something other than [`DefaultClassifier`].
    pub fn classifier(mut self, classifier: Arc<dyn Classify>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Build a bare scheduler. Validates the configuration.
    pub fn build_scheduler(self) -> Result<Scheduler, AdmissionError> {
        let Self {
            config,
            spawner,
            audit,
            ..
        } = self;
        Scheduler::with_audit(config, resolve_spawner(spawner)?, audit)
    }

    /// Build an admission gate over a fresh scheduler.
    pub fn build_gate(self) -> Result<AdmissionGate, AdmissionError> {
        let Self {
            config,
            spawner,
            audit,
            classifier,
        } = self;
        let scheduler = Scheduler::with_audit(config, resolve_spawner(spawner)?, audit)?;
        let classifier = classifier.unwrap_or_else(|| Arc::new(DefaultClassifier));
        Ok(AdmissionGate::new(scheduler, classifier))
    }
}

fn resolve_spawner(given: Option<Arc<dyn Spawn>>) -> Result<Arc<dyn Spawn>, AdmissionError> {
    if let Some(spawner) = given {
        return Ok(spawner);
    }
    TokioSpawner::try_current()
        .map(|spawner| Arc::new(spawner) as Arc<dyn Spawn>)
        .ok_or_else(|| {
            AdmissionError::InvalidConfig("no spawner given and no tokio runtime in scope".into())
        })
}
