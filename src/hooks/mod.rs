//! Hook contracts and the chain dispatcher.
//!
//! The host broker offers every inbound event to a [`HookChain`]; hooks
//! subscribe to the lifecycle points they care about and are invoked in
//! registration order. A publish hook may rewrite the payload or signal
//! rejection, which short-circuits the chain and causes the broker to drop
//! the message silently. Outbound traffic flows the other way through
//! [`PublishSink`], implemented by the host.
//!
//! - `dedupe` - Time-windowed duplicate suppression
//! - `enrich` - Sender-origin payload enrichment
//! - `notify` - Connect/disconnect announcements

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

pub mod dedupe;
pub mod enrich;
pub mod notify;

pub use dedupe::{DedupeCache, DedupeDecision, DedupeHook, DedupeStats, ReconfigureError};
pub use enrich::OriginEnrichHook;
pub use notify::{ConnectNotifier, NotifyWorker};

/// Lifecycle points a hook may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Publish,
    Connect,
    Disconnect,
}

/// Identity of the client behind an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Stable client identifier.
    pub client_id: String,
    /// Remote network address as reported by the transport.
    pub remote_addr: String,
}

impl ClientInfo {
    pub fn new(client_id: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            remote_addr: remote_addr.into(),
        }
    }
}

/// Outcome of publish interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishAction {
    /// Continue delivery with the (possibly rewritten) payload.
    Deliver(Bytes),
    /// Drop the message silently: no subscriber delivery, no persistence,
    /// no error surfaced to the publisher.
    Reject,
}

/// Failure raised by a hook while handling one event.
///
/// An error aborts delivery of that event only; it never tears down the
/// chain or the connection.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("payload encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reported by the host broker for an outbound publish.
#[derive(Debug, Error)]
#[error("publish to {topic} failed: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

impl PublishError {
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

/// Outbound publish capability implemented by the host broker.
pub trait PublishSink: Send + Sync + 'static {
    fn publish(&self, topic: &str, payload: Bytes, qos: u8, retain: bool)
        -> Result<(), PublishError>;
}

/// Publish/connect/disconnect interception points offered to the host.
///
/// Default implementations pass events through untouched so a hook only
/// overrides the lifecycle points it declares via [`Hook::provides`].
pub trait Hook: Send + Sync {
    /// Stable identifier used in registration diagnostics.
    fn id(&self) -> &'static str;

    /// Which lifecycle points this hook wants.
    fn provides(&self, event: HookEvent) -> bool;

    fn on_publish(
        &self,
        _client: &ClientInfo,
        _topic: &str,
        payload: Bytes,
    ) -> Result<PublishAction, HookError> {
        Ok(PublishAction::Deliver(payload))
    }

    fn on_connect(&self, _client: &ClientInfo) -> Result<(), HookError> {
        Ok(())
    }

    fn on_disconnect(&self, _client: &ClientInfo, _reason: Option<&str>, _expired: bool) {}
}

/// Dispatches events to registered hooks in registration order.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; dispatch order is registration order.
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        tracing::debug!(id = hook.id(), "hook registered");
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Offer a publish to every subscribed hook in order.
    ///
    /// Each hook observes the payload as rewritten by its predecessors. A
    /// rejection short-circuits the remaining hooks; an error aborts
    /// delivery of this one event and is returned to the host.
    pub fn dispatch_publish(
        &self,
        client: &ClientInfo,
        topic: &str,
        payload: Bytes,
    ) -> Result<PublishAction, HookError> {
        let mut current = payload;
        for hook in &self.hooks {
            if !hook.provides(HookEvent::Publish) {
                continue;
            }
            match hook.on_publish(client, topic, current)? {
                PublishAction::Deliver(next) => current = next,
                PublishAction::Reject => return Ok(PublishAction::Reject),
            }
        }
        Ok(PublishAction::Deliver(current))
    }

    /// Offer a connect event to every subscribed hook.
    ///
    /// Hook failures are logged and swallowed; the connection proceeds.
    pub fn dispatch_connect(&self, client: &ClientInfo) {
        for hook in &self.hooks {
            if !hook.provides(HookEvent::Connect) {
                continue;
            }
            if let Err(err) = hook.on_connect(client) {
                tracing::warn!(
                    id = hook.id(),
                    client = %client.client_id,
                    "connect hook failed, connection proceeds: {err}"
                );
            }
        }
    }

    /// Offer a disconnect event to every subscribed hook.
    pub fn dispatch_disconnect(&self, client: &ClientInfo, reason: Option<&str>, expired: bool) {
        for hook in &self.hooks {
            if hook.provides(HookEvent::Disconnect) {
                hook.on_disconnect(client, reason, expired);
            }
        }
    }
}
