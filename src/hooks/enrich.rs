//! Sender-origin payload enrichment for configured topics.
//!
//! Downstream consumers of selected topics want to know which network
//! address a report came from. Qualifying payloads are wrapped as
//! `{"meta":{"ip":...},"data":<original>}`; every other topic passes
//! through byte-for-byte.

use crate::core::config::EnrichConfig;
use crate::hooks::{ClientInfo, Hook, HookError, HookEvent, PublishAction};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Serialize)]
struct Meta<'a> {
    ip: &'a str,
}

/// Publish-interception hook wrapping qualifying payloads with sender
/// metadata.
///
/// Stateless apart from the topic set, so it is freely shared across
/// concurrent publish events. Registered after duplicate suppression:
/// duplicates never reach this stage, and suppression always examines
/// un-enriched payloads.
pub struct OriginEnrichHook {
    topics: HashSet<String>,
}

impl OriginEnrichHook {
    pub fn new(config: EnrichConfig) -> Self {
        Self {
            topics: config.topics,
        }
    }

    fn envelope(remote_addr: &str, payload: &[u8]) -> Result<Bytes, HookError> {
        let meta = serde_json::to_vec(&Meta { ip: remote_addr })?;
        let mut out = BytesMut::with_capacity(meta.len() + payload.len() + 18);
        out.put_slice(b"{\"meta\":");
        out.put_slice(&meta);
        out.put_slice(b",\"data\":");
        // Spliced verbatim: the wrapped payload is not required to be
        // valid JSON and is never parsed here.
        out.put_slice(payload);
        out.put_u8(b'}');
        Ok(out.freeze())
    }
}

impl Hook for OriginEnrichHook {
    fn id(&self) -> &'static str {
        "origin-enrich"
    }

    fn provides(&self, event: HookEvent) -> bool {
        event == HookEvent::Publish
    }

    fn on_publish(
        &self,
        client: &ClientInfo,
        topic: &str,
        payload: Bytes,
    ) -> Result<PublishAction, HookError> {
        if !self.topics.contains(topic) {
            return Ok(PublishAction::Deliver(payload));
        }
        let wrapped = Self::envelope(&client.remote_addr, &payload)?;
        Ok(PublishAction::Deliver(wrapped))
    }
}
