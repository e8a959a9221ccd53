// ============================================================================
// Dispatch Engine
// ============================================================================
//
// Sending a message:
// 1. Validate the content key and the sender address
// 2. Resolve recipient (local alias) and sender (local alias, or the
//    sender's home pod) concurrently
// 3. Push over the recipient's live channel, or store the envelope if no
//    channel is bound. Never both.
//
// ============================================================================

use chrono::Utc;
use muttr_types::{validate_alias_name, validate_content_key, Contact, Envelope, Party, PeerAddress};
use std::sync::Arc;

use crate::bus::Bus;
use crate::error::PodResult;
use crate::federation::FederationClient;
use crate::metrics;
use crate::registry::IdentityRegistry;
use crate::storage::EnvelopeStore;

/// How an envelope left the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pushed,
    Stored,
}

#[derive(Clone)]
pub struct Dispatcher {
    public_address: String,
    registry: IdentityRegistry,
    federation: FederationClient,
    bus: Bus,
    envelopes: Arc<dyn EnvelopeStore>,
}

impl Dispatcher {
    pub fn new(
        public_address: String,
        registry: IdentityRegistry,
        federation: FederationClient,
        bus: Bus,
        envelopes: Arc<dyn EnvelopeStore>,
    ) -> Self {
        Self {
            public_address,
            registry,
            federation,
            bus,
            envelopes,
        }
    }

    /// Deliver a content reference from `from` to local alias `to`
    pub async fn dispatch(&self, to: &str, from: &str, key: &str) -> PodResult<(Envelope, Delivery)> {
        validate_content_key(key)?;
        let sender_address = PeerAddress::parse(from)?;
        validate_alias_name(&sender_address.alias)?;

        let (recipient_pubkeyhash, sender_pubkeyhash) = tokio::try_join!(
            self.resolve_recipient(to),
            self.resolve_sender(&sender_address),
        )?;

        let envelope = Envelope {
            recipient: Party {
                user_id: to.to_string(),
                pubkeyhash: recipient_pubkeyhash,
            },
            sender: Party {
                user_id: from.to_string(),
                pubkeyhash: sender_pubkeyhash,
            },
            key: key.to_string(),
            timestamp: Utc::now(),
        };

        if self.bus.push(&envelope).await {
            tracing::debug!(
                recipient = %envelope.recipient.pubkeyhash,
                sender = %envelope.sender.pubkeyhash,
                "Envelope pushed to live channel"
            );
            return Ok((envelope, Delivery::Pushed));
        }

        self.envelopes.insert_envelope(&envelope).await?;
        metrics::ENVELOPES_STORED_TOTAL.inc();
        tracing::debug!(
            recipient = %envelope.recipient.pubkeyhash,
            sender = %envelope.sender.pubkeyhash,
            "Envelope stored for later retrieval"
        );
        Ok((envelope, Delivery::Stored))
    }

    async fn resolve_recipient(&self, alias: &str) -> PodResult<String> {
        Ok(self.registry.resolve_alias(alias).await?.pubkeyhash)
    }

    async fn resolve_sender(&self, address: &PeerAddress) -> PodResult<String> {
        if address.is_hosted_on(&self.public_address) {
            return Ok(self.registry.resolve_alias(&address.alias).await?.pubkeyhash);
        }

        let key = self.federation.lookup_alias(address).await?;
        Ok(key.pubkeyhash())
    }
}

/// Group envelopes into per-sender contacts
///
/// Contacts appear in the order their sender first occurs in `envelopes`;
/// each contact's messages are sorted newest first.
pub fn build_inboxes_from(envelopes: Vec<Envelope>) -> Vec<Contact> {
    let mut contacts: Vec<Contact> = Vec::new();

    for envelope in envelopes {
        match contacts
            .iter_mut()
            .find(|c| c.user_id == envelope.sender.user_id)
        {
            Some(contact) => contact.messages.push(envelope),
            None => contacts.push(Contact {
                user_id: envelope.sender.user_id.clone(),
                messages: vec![envelope],
            }),
        }
    }

    for contact in &mut contacts {
        contact
            .messages
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }

    contacts
}
