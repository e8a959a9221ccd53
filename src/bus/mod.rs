// ============================================================================
// Realtime Bus
// ============================================================================
//
// Process-wide pool of live push channels keyed by pubkeyhash. Only the
// channel handshake binds entries and only channel teardown removes them;
// everyone else sees the pool through `push`.
//
// ============================================================================

pub mod server;

pub use server::run_bus_server;

use muttr_types::Envelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::metrics;

/// Frames written to a push channel, serialized as JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusFrame {
    /// Handshake accepted; the channel now receives pushes for `pubkeyhash`
    Bound { pubkeyhash: String },
    Envelope(Envelope),
}

/// Sending half of one connected channel
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<BusFrame>,
}

impl ChannelHandle {
    pub fn new(tx: mpsc::UnboundedSender<BusFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Default)]
pub struct Bus {
    channels: Arc<RwLock<HashMap<String, ChannelHandle>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` for `pubkeyhash`, returning the handle it replaced
    ///
    /// The replaced channel stays open but no longer receives pushes.
    pub(crate) async fn bind(&self, pubkeyhash: &str, channel: ChannelHandle) -> Option<ChannelHandle> {
        let mut channels = self.channels.write().await;
        let previous = channels.insert(pubkeyhash.to_string(), channel);
        metrics::BUS_BOUND_CHANNELS.set(channels.len() as i64);
        previous
    }

    /// Drop every binding that points at channel `id`
    pub(crate) async fn unbind(&self, id: Uuid) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, handle| handle.id != id);
        metrics::BUS_BOUND_CHANNELS.set(channels.len() as i64);
        before - channels.len()
    }

    pub async fn is_bound(&self, pubkeyhash: &str) -> bool {
        self.channels.read().await.contains_key(pubkeyhash)
    }

    /// Hand `envelope` to the recipient's live channel
    ///
    /// Returns false when no channel is bound for the recipient or the bound
    /// channel has already gone away.
    pub async fn push(&self, envelope: &Envelope) -> bool {
        let channels = self.channels.read().await;
        let Some(handle) = channels.get(&envelope.recipient.pubkeyhash) else {
            return false;
        };

        if handle.tx.send(BusFrame::Envelope(envelope.clone())).is_err() {
            tracing::debug!(
                pubkeyhash = %envelope.recipient.pubkeyhash,
                "Bound channel is closing, falling back to storage"
            );
            return false;
        }

        metrics::ENVELOPES_PUSHED_TOTAL.inc();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use muttr_types::Party;

    fn envelope_to(pubkeyhash: &str) -> Envelope {
        Envelope {
            recipient: Party {
                user_id: "alice".into(),
                pubkeyhash: pubkeyhash.into(),
            },
            sender: Party {
                user_id: "bob@pod".into(),
                pubkeyhash: "bb".into(),
            },
            key: "0123456789012345678901234567890123456789".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_push_requires_binding() {
        let bus = Bus::new();
        assert!(!bus.push(&envelope_to("aa")).await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.bind("aa", ChannelHandle::new(tx)).await;

        let envelope = envelope_to("aa");
        assert!(bus.push(&envelope).await);
        assert_eq!(rx.recv().await, Some(BusFrame::Envelope(envelope)));
        assert!(!bus.push(&envelope_to("cc")).await);
    }

    #[tokio::test]
    async fn test_last_bind_wins() {
        let bus = Bus::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        let old = ChannelHandle::new(old_tx);
        let old_id = old.id();
        assert!(bus.bind("aa", old).await.is_none());
        let replaced = bus.bind("aa", ChannelHandle::new(new_tx)).await;
        assert_eq!(replaced.map(|h| h.id()), Some(old_id));

        assert!(bus.push(&envelope_to("aa")).await);
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());

        // Tearing down the replaced channel leaves the new binding alone
        assert_eq!(bus.unbind(old_id).await, 0);
        assert!(bus.is_bound("aa").await);
    }

    #[tokio::test]
    async fn test_unbind_and_dead_channel() {
        let bus = Bus::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ChannelHandle::new(tx);
        let id = handle.id();
        bus.bind("aa", handle.clone()).await;
        bus.bind("dd", handle).await;

        drop(rx);
        assert!(!bus.push(&envelope_to("aa")).await);

        assert_eq!(bus.unbind(id).await, 2);
        assert!(!bus.is_bound("aa").await);
        assert!(!bus.is_bound("dd").await);
    }

    #[test]
    fn test_frame_wire_format() {
        let bound = serde_json::to_value(BusFrame::Bound {
            pubkeyhash: "aa".into(),
        })
        .unwrap();
        assert_eq!(bound, serde_json::json!({"type": "bound", "pubkeyhash": "aa"}));

        let pushed = serde_json::to_value(BusFrame::Envelope(envelope_to("aa"))).unwrap();
        assert_eq!(pushed["type"], "envelope");
        assert_eq!(pushed["recipient"]["userID"], "alice");
    }
}
