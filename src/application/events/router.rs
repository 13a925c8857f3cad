//! Event router - multi-subscriber dispatch with per-handler isolation

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::application::errors::{EventHandlerError, PluginError};
use crate::application::guard::guarded;
use crate::domain::entities::{Event, Propagation};

pub type SubscriptionId = u64;

/// Event handler trait
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<Propagation, PluginError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Propagation, PluginError>> + Send,
{
    async fn handle(&self, event: &Event) -> Result<Propagation, PluginError> {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as an event handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Propagation, PluginError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    owner: String,
    priority: i32,
    handler: Arc<dyn EventHandler>,
}

/// One handler invocation in a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRecord {
    pub subscription: SubscriptionId,
    pub owner: String,
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub event_type: String,
    /// Handlers invoked, in call order
    pub invoked: Vec<HandlerRecord>,
    pub failures: Vec<EventHandlerError>,
    /// Owner of the handler that stopped propagation
    pub stopped_by: Option<String>,
    /// Handlers unregistered while the dispatch was in flight
    pub skipped: usize,
}

impl DispatchReport {
    pub fn is_stopped(&self) -> bool {
        self.stopped_by.is_some()
    }

    pub fn failed_owners(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.plugin.as_str()).collect()
    }

    pub fn invoked_owners(&self) -> Vec<&str> {
        self.invoked.iter().map(|r| r.owner.as_str()).collect()
    }
}

/// Routes events to subscribers in descending priority order
pub struct EventRouter {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
    handler_timeout: Option<Duration>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            handler_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Subscribe `handler` to `event_type`. Equal priorities keep registration order.
    pub fn register(
        &self,
        event_type: &str,
        owner: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        let list = subs.entry(event_type.to_string()).or_default();
        // Kept sorted: insert after every handler with priority >= ours
        let at = list.partition_point(|s| s.priority >= priority);
        list.insert(
            at,
            Subscription {
                id,
                owner: owner.to_string(),
                priority,
                handler,
            },
        );
        tracing::debug!(plugin = %owner, event = %event_type, priority, "Subscribed handler {}", id);
        id
    }

    pub fn unregister(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subs.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        before != list.len()
    }

    /// Drop every subscription owned by `owner`
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let mut subs = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for list in subs.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed += before - list.len();
        }
        subs.retain(|_, list| !list.is_empty());
        if removed > 0 {
            tracing::debug!(plugin = %owner, "Unsubscribed {} handlers", removed);
        }
        removed
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn is_registered(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .is_some_and(|list| list.iter().any(|s| s.id == id))
    }

    /// Invoke handlers for the event sequentially. Handler errors are
    /// recorded in the report and never escape.
    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let snapshot: Vec<Subscription> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport {
            event_type: event.event_type.clone(),
            ..DispatchReport::default()
        };

        for sub in snapshot {
            // The owner may have left Enabled while earlier handlers ran
            if !self.is_registered(&event.event_type, sub.id) {
                report.skipped += 1;
                continue;
            }
            report.invoked.push(HandlerRecord {
                subscription: sub.id,
                owner: sub.owner.clone(),
            });
            let result = guarded(
                &sub.owner,
                "event handler",
                self.handler_timeout,
                sub.handler.handle(event),
            )
            .await;
            match result {
                Ok(Propagation::Continue) => {}
                Ok(Propagation::Stop) => {
                    tracing::debug!(plugin = %sub.owner, event = %event.event_type, "Propagation stopped");
                    report.stopped_by = Some(sub.owner);
                    break;
                }
                Err(e) => {
                    tracing::warn!(plugin = %sub.owner, event = %event.event_type, "Event handler failed: {}", e);
                    report.failures.push(EventHandlerError {
                        plugin: sub.owner,
                        subscription: sub.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
