use crate::errors::ConsentError;
use crate::settings::Publisher as PublisherCfg;
use crate::storage::DetailedConsentResource;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Attribute carrying the per-consent correlation key used to derive dedup
/// identifiers for lifecycle events.
pub const REQUEST_URI_KEY: &str = "requestUriKey";

/// Authorization type marking the principal whose identity is used for
/// reporting. At most one per consent, by convention.
pub const PRIMARY_MEMBER_AUTHORIZATION_TYPE: &str = "primary_member";

/// Reporting payload handed to the external publishing collaborator on every
/// committed status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentLifecycleEvent {
    pub consent_id: String,
    pub consent_details: DetailedConsentResource,
    pub current_status: String,
    pub previous_status: String,
}

/// External publishing collaborator. The transport behind it is out of
/// scope here; delivery intent is at-most-once per dedup window.
pub trait EventSink: Send + Sync {
    fn publish(
        &self,
        stream_name: &str,
        stream_version: &str,
        event: &ConsentLifecycleEvent,
    ) -> Result<(), ConsentError>;
}

/// Publishes lifecycle events after committed status transitions,
/// suppressing repeated publications of the same logical event within a
/// bounded, time-expiring window.
pub struct LifecycleEventPublisher {
    enabled: bool,
    stream_name: String,
    stream_version: String,
    published: Cache<String, ()>,
    sink: Arc<dyn EventSink>,
}

impl LifecycleEventPublisher {
    pub fn new(cfg: &PublisherCfg, sink: Arc<dyn EventSink>) -> Self {
        Self {
            enabled: cfg.enabled,
            stream_name: cfg.stream_name.clone(),
            stream_version: cfg.stream_version.clone(),
            published: Cache::builder()
                .max_capacity(cfg.dedup_capacity)
                .time_to_live(Duration::from_secs(cfg.dedup_ttl_secs))
                .build(),
            sink,
        }
    }

    /// Notify a committed transition. Never fails: a sink error is logged
    /// and swallowed, the committed status change stands either way.
    pub fn notify(&self, consent_details: &DetailedConsentResource, previous_status: &str) {
        if !self.enabled {
            debug!("Event publishing is disabled");
            return;
        }

        let Some(primary_user) = primary_member_user(consent_details) else {
            debug!(
                consent_id = %consent_details.consent_id,
                "No primary member on consent, skipping lifecycle event"
            );
            return;
        };

        let current_status = consent_details.current_status.clone();

        // Dedup applies only when the consent carries a correlation key;
        // without one every transition is published
        if let Some(correlation_key) = consent_details.attributes.get(REQUEST_URI_KEY) {
            let identifier = format!("{}:{}", correlation_key, current_status);
            let entry = self.published.entry(identifier.clone()).or_insert(());
            if !entry.is_fresh() {
                debug!(
                    identifier = %identifier,
                    "Lifecycle event already published within dedup window, skipping"
                );
                return;
            }
        }

        let event = ConsentLifecycleEvent {
            consent_id: consent_details.consent_id.clone(),
            consent_details: consent_details.clone(),
            current_status,
            previous_status: previous_status.to_string(),
        };

        debug!(
            consent_id = %event.consent_id,
            user_id = %primary_user,
            "Publishing consent lifecycle event"
        );
        if let Err(e) = self
            .sink
            .publish(&self.stream_name, &self.stream_version, &event)
        {
            error!(
                consent_id = %event.consent_id,
                "Failed to publish consent lifecycle event: {}",
                e
            );
        }
    }
}

/// Sink that logs the payload instead of shipping it anywhere. Default
/// registration; useful for installations without a reporting pipeline.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(
        &self,
        stream_name: &str,
        stream_version: &str,
        event: &ConsentLifecycleEvent,
    ) -> Result<(), ConsentError> {
        info!(
            stream_name,
            stream_version,
            consent_id = %event.consent_id,
            current_status = %event.current_status,
            previous_status = %event.previous_status,
            "Consent lifecycle event"
        );
        Ok(())
    }
}

type SinkFactory = Arc<dyn Fn() -> Arc<dyn EventSink> + Send + Sync>;

/// Maps a sink name to a factory, resolved at startup from configuration.
/// Hosts register their transport implementations here and pick one by the
/// `publisher.sink` settings key; no runtime class loading involved.
#[derive(Clone)]
pub struct SinkRegistry {
    factories: HashMap<String, SinkFactory>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("log", || Arc::new(LogSink));
        registry
    }

    pub fn register<S, F>(&mut self, name: &str, factory: F)
    where
        S: EventSink + 'static,
        F: Fn() -> Arc<S> + Send + Sync + 'static,
    {
        self.factories.insert(
            name.to_string(),
            Arc::new(move || -> Arc<dyn EventSink> { factory() }),
        );
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn EventSink>, ConsentError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| {
                ConsentError::Validation(format!("unknown event sink: {}", name))
            })
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The user of the primary-member authorization, if any. Uniqueness of the
/// primary member is a convention the store does not enforce; when several
/// are present the last one wins.
fn primary_member_user(consent: &DetailedConsentResource) -> Option<String> {
    consent
        .authorizations
        .iter()
        .filter(|a| a.authorization_type == PRIMARY_MEMBER_AUTHORIZATION_TYPE)
        .filter_map(|a| a.user_id.clone())
        .last()
}
