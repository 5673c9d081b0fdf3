// src/registry.rs
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::job::{Job, Lineage};
use crate::retry::RetryPolicy;
use crate::store::RecordId;
use crate::transmit::TransmissionAttempt;

/// Runs once for each job whose transmission was confirmed.
#[async_trait]
pub trait SuccessHook: Send + Sync {
    async fn on_success(&self, job: &Job) -> io::Result<()>;
}

/// Runs once for each job that ran out of retries. Only lineages that are
/// swept by the relay should carry one.
#[async_trait]
pub trait ExhaustionHook: Send + Sync {
    async fn on_exhausted(&self, job: &Job) -> Result<RecordId, StoreError>;
}

/// Everything a worker needs to run one lineage.
#[derive(Clone)]
pub struct Route {
    pub queue: String,
    pub policy: RetryPolicy,
    pub transmitter: Arc<dyn TransmissionAttempt>,
    pub on_success: Option<Arc<dyn SuccessHook>>,
    pub on_exhausted: Option<Arc<dyn ExhaustionHook>>,
}

impl Route {
    pub fn new(
        queue: impl Into<String>,
        policy: RetryPolicy,
        transmitter: Arc<dyn TransmissionAttempt>,
    ) -> Self {
        Self {
            queue: queue.into(),
            policy,
            transmitter,
            on_success: None,
            on_exhausted: None,
        }
    }

    pub fn on_success(mut self, hook: Arc<dyn SuccessHook>) -> Self {
        self.on_success = Some(hook);
        self
    }

    pub fn on_exhausted(mut self, hook: Arc<dyn ExhaustionHook>) -> Self {
        self.on_exhausted = Some(hook);
        self
    }
}

/// Dispatch table from lineage to route, built once at start-up.
#[derive(Clone, Default)]
pub struct Registry {
    routes: HashMap<Lineage, Route>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, lineage: Lineage, route: Route) -> Self {
        self.routes.insert(lineage, route);
        self
    }

    pub fn route(&self, lineage: Lineage) -> Option<&Route> {
        self.routes.get(&lineage)
    }

    pub fn queue_for(&self, lineage: Lineage) -> Option<&str> {
        self.route(lineage).map(|route| route.queue.as_str())
    }

    /// Distinct queue names across all routes.
    pub fn queues(&self) -> Vec<&str> {
        let mut queues: Vec<&str> = self.routes.values().map(|r| r.queue.as_str()).collect();
        queues.sort_unstable();
        queues.dedup();
        queues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmit::ScriptedTransmitter;

    #[test]
    fn routes_are_looked_up_by_lineage() {
        let transmitter = Arc::new(ScriptedTransmitter::default());
        let registry = Registry::new()
            .register(
                Lineage::Broadcast,
                Route::new("broadcast", RetryPolicy::default(), transmitter.clone()),
            )
            .register(
                Lineage::Relay,
                Route::new("relay", RetryPolicy::default(), transmitter),
            );

        assert_eq!(registry.queue_for(Lineage::Broadcast), Some("broadcast"));
        assert_eq!(registry.queue_for(Lineage::Relay), Some("relay"));
        assert_eq!(registry.queues(), vec!["broadcast", "relay"]);
        assert!(registry.route(Lineage::Relay).is_some_and(|r| r.on_exhausted.is_none()));
    }

    #[test]
    fn missing_lineage_has_no_route() {
        let registry = Registry::new().register(
            Lineage::Relay,
            Route::new(
                "shared",
                RetryPolicy::default(),
                Arc::new(ScriptedTransmitter::default()),
            ),
        );
        assert!(registry.route(Lineage::Broadcast).is_none());
        assert_eq!(registry.queues(), vec!["shared"]);
    }
}
