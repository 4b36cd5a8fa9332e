//! Connect/disconnect announcements on well-known control topics.
//!
//! Interested subscribers watch the connect/disconnect topics to track
//! which clients are online. Announcements are handed to a bounded queue
//! drained by a separate worker, so the connection lifecycle never waits
//! on delivery, and a failed or dropped announcement never disturbs the
//! connection that triggered it.

use crate::core::config::NotifyConfig;
use crate::hooks::{ClientInfo, Hook, HookError, HookEvent, PublishSink};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Serialize)]
struct ConnectNotice<'a> {
    uuid: &'a str,
    ip: &'a str,
}

#[derive(Serialize)]
struct DisconnectNotice<'a> {
    uuid: &'a str,
}

/// A queued announcement awaiting delivery.
struct Notice {
    topic: String,
    payload: Bytes,
}

/// Connect/disconnect hook handing announcements to the worker queue.
///
/// Stateless beyond its configuration, so concurrent connect/disconnect
/// events need no coordination here.
pub struct ConnectNotifier {
    tx: mpsc::Sender<Notice>,
    connect_topic: String,
    disconnect_topic: String,
}

/// Drains the announcement queue into the host's [`PublishSink`].
///
/// Runs until every [`ConnectNotifier`] handle is dropped and the queue is
/// empty. Sink failures are logged and swallowed.
pub struct NotifyWorker {
    rx: mpsc::Receiver<Notice>,
    qos: u8,
    retain: bool,
}

impl ConnectNotifier {
    /// Build the notifier and its worker. The caller decides when to spawn
    /// the worker (normally the pipeline's `start`).
    pub fn new(config: NotifyConfig) -> (Self, NotifyWorker) {
        let (tx, rx) = mpsc::channel(config.queue_depth);
        (
            Self {
                tx,
                connect_topic: config.connect_topic,
                disconnect_topic: config.disconnect_topic,
            },
            NotifyWorker {
                rx,
                qos: config.qos,
                retain: config.retain,
            },
        )
    }

    fn enqueue(&self, topic: &str, payload: Vec<u8>) {
        let notice = Notice {
            topic: topic.to_string(),
            payload: Bytes::from(payload),
        };
        // Queue pressure must never stall a connection; drop and move on.
        if let Err(err) = self.tx.try_send(notice) {
            tracing::warn!(topic, "announcement queue full, dropping: {err}");
        }
    }
}

impl NotifyWorker {
    pub async fn run(mut self, sink: Arc<dyn PublishSink>) {
        while let Some(notice) = self.rx.recv().await {
            if let Err(err) = sink.publish(&notice.topic, notice.payload, self.qos, self.retain) {
                tracing::warn!("announcement publish failed: {err}");
            }
        }
        tracing::debug!("announcement worker stopping");
    }
}

impl Hook for ConnectNotifier {
    fn id(&self) -> &'static str {
        "connect-notify"
    }

    fn provides(&self, event: HookEvent) -> bool {
        matches!(event, HookEvent::Connect | HookEvent::Disconnect)
    }

    fn on_connect(&self, client: &ClientInfo) -> Result<(), HookError> {
        let payload = serde_json::to_vec(&ConnectNotice {
            uuid: &client.client_id,
            ip: &client.remote_addr,
        })?;
        tracing::debug!(client = %client.client_id, topic = %self.connect_topic, "announcing connect");
        self.enqueue(&self.connect_topic, payload);
        Ok(())
    }

    fn on_disconnect(&self, client: &ClientInfo, _reason: Option<&str>, _expired: bool) {
        match serde_json::to_vec(&DisconnectNotice {
            uuid: &client.client_id,
        }) {
            Ok(payload) => {
                tracing::debug!(client = %client.client_id, topic = %self.disconnect_topic, "announcing disconnect");
                self.enqueue(&self.disconnect_topic, payload);
            }
            Err(err) => tracing::debug!("disconnect notice encode failed: {err}"),
        }
    }
}
