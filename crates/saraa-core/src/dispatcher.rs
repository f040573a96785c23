//! Dispatcher: fans a routing decision out to responders
//!
//! One tokio task per entry, each bounded by `call_timeout`. Results are
//! collected positionally, so output order is the decision's order no matter
//! which responder finishes first. The whole call is bounded by
//! `call_timeout + turn_overhead`; anything still running then is aborted
//! and reported as a timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::context::ConversationContext;
use crate::error::ResponderError;
use crate::responders::{ResponderRegistry, ResponderRequest};
use crate::types::{FailureKind, IntentKind, Query, ResponderResult, RouteEntry, RoutingDecision};

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-responder call timeout
    pub call_timeout: Duration,
    /// Slack on top of `call_timeout` for the whole dispatch
    pub turn_overhead: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            turn_overhead: Duration::from_millis(250),
        }
    }
}

impl DispatcherConfig {
    pub fn turn_budget(&self) -> Duration {
        self.call_timeout + self.turn_overhead
    }
}

/// Output slot for one decision entry
enum Slot {
    Ready(ResponderResult),
    Running {
        responder_id: String,
        intent: IntentKind,
        handle: JoinHandle<ResponderResult>,
    },
}

pub struct Dispatcher {
    registry: Arc<ResponderRegistry>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<ResponderRegistry>, config: DispatcherConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResponderRegistry> {
        &self.registry
    }

    /// Invoke every entry of `decision` once. Always returns exactly one
    /// result per entry, in entry order.
    pub async fn dispatch(
        &self,
        query: &Query,
        decision: &RoutingDecision,
        context: Arc<ConversationContext>,
    ) -> Vec<ResponderResult> {
        let started = Instant::now();
        let deadline = started + self.config.turn_budget();

        let slots: Vec<Slot> = decision
            .entries
            .iter()
            .map(|entry| self.start(query, entry, Arc::clone(&context)))
            .collect();

        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            let result = match slot {
                Slot::Ready(result) => result,
                Slot::Running {
                    responder_id,
                    intent,
                    mut handle,
                } => match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        warn!("Responder '{}' panicked: {}", responder_id, e);
                        ResponderResult::failure(
                            &responder_id,
                            intent,
                            FailureKind::ResponderError,
                            format!("task failed: {}", e),
                            started.elapsed(),
                        )
                    }
                    Err(_) => {
                        handle.abort();
                        warn!("Responder '{}' aborted at the turn deadline", responder_id);
                        ResponderResult::failure(
                            &responder_id,
                            intent,
                            FailureKind::Timeout,
                            "turn budget exceeded",
                            started.elapsed(),
                        )
                    }
                },
            };
            results.push(result);
        }

        debug!(
            "Dispatched {} entries for query {} in {:?}",
            results.len(),
            query.id,
            started.elapsed()
        );
        results
    }

    /// Check an entry and spawn its responder, or settle it immediately
    fn start(&self, query: &Query, entry: &RouteEntry, context: Arc<ConversationContext>) -> Slot {
        let intent = entry.intent.kind;
        let responder_id = entry.responder_id.clone();

        let missing: Vec<String> = entry
            .required_slots
            .iter()
            .filter(|slot| !entry.intent.has_slot(**slot))
            .map(|slot| slot.to_string())
            .collect();
        if !missing.is_empty() {
            debug!("Skipping '{}': missing {:?}", responder_id, missing);
            return Slot::Ready(ResponderResult::failure(
                &responder_id,
                intent,
                FailureKind::InvalidEntities,
                format!("missing required slot(s): {}", missing.join(", ")),
                Duration::ZERO,
            ));
        }

        let Some(responder) = self.registry.get(&responder_id) else {
            warn!("Responder '{}' is not registered", responder_id);
            return Slot::Ready(ResponderResult::failure(
                &responder_id,
                intent,
                FailureKind::ResponderError,
                "responder not registered",
                Duration::ZERO,
            ));
        };

        let request = ResponderRequest {
            query: query.clone(),
            intent: entry.intent.clone(),
            context,
        };
        let call_timeout = self.config.call_timeout;
        let id = responder_id.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(call_timeout, responder.handle(&request)).await;
            let latency = started.elapsed();
            match outcome {
                Ok(Ok(payload)) => {
                    debug!("Responder '{}' answered in {:?}", id, latency);
                    ResponderResult::success(&id, intent, payload, latency)
                }
                Ok(Err(ResponderError::InvalidEntities(reason))) => {
                    debug!("Responder '{}' rejected entities: {}", id, reason);
                    ResponderResult::failure(&id, intent, FailureKind::InvalidEntities, reason, latency)
                }
                Ok(Err(e)) => {
                    warn!("Responder '{}' failed: {}", id, e);
                    ResponderResult::failure(&id, intent, FailureKind::ResponderError, e.to_string(), latency)
                }
                Err(_) => {
                    warn!("Responder '{}' timed out after {:?}", id, call_timeout);
                    ResponderResult::failure(
                        &id,
                        intent,
                        FailureKind::Timeout,
                        format!("no answer within {}ms", call_timeout.as_millis()),
                        latency,
                    )
                }
            }
        });

        Slot::Running {
            responder_id,
            intent,
            handle,
        }
    }
}
