//! Event type definitions.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{Address, ChainId, TxHash};

/// Discriminator of a [`DomainEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ChainUpdate,
    SafeAppsUpdate,
    PendingMultisigTransaction,
    DeletedMultisigTransaction,
    ExecutedMultisigTransaction,
    NewConfirmation,
    ModuleTransaction,
    IncomingEther,
    OutgoingEther,
    IncomingToken,
    OutgoingToken,
    MessageCreated,
    NewMessageConfirmation,
    SafeCreated,
    ReorgDetected,
    NewDelegate,
    UpdatedDelegate,
    DeletedDelegate,
}

impl EventType {
    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChainUpdate => "CHAIN_UPDATE",
            EventType::SafeAppsUpdate => "SAFE_APPS_UPDATE",
            EventType::PendingMultisigTransaction => "PENDING_MULTISIG_TRANSACTION",
            EventType::DeletedMultisigTransaction => "DELETED_MULTISIG_TRANSACTION",
            EventType::ExecutedMultisigTransaction => "EXECUTED_MULTISIG_TRANSACTION",
            EventType::NewConfirmation => "NEW_CONFIRMATION",
            EventType::ModuleTransaction => "MODULE_TRANSACTION",
            EventType::IncomingEther => "INCOMING_ETHER",
            EventType::OutgoingEther => "OUTGOING_ETHER",
            EventType::IncomingToken => "INCOMING_TOKEN",
            EventType::OutgoingToken => "OUTGOING_TOKEN",
            EventType::MessageCreated => "MESSAGE_CREATED",
            EventType::NewMessageConfirmation => "NEW_MESSAGE_CONFIRMATION",
            EventType::SafeCreated => "SAFE_CREATED",
            EventType::ReorgDetected => "REORG_DETECTED",
            EventType::NewDelegate => "NEW_DELEGATE",
            EventType::UpdatedDelegate => "UPDATED_DELEGATE",
            EventType::DeletedDelegate => "DELETED_DELEGATE",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event produced by the transaction indexer.
///
/// Events are immutable. `address` is always the safe the event concerns;
/// identifiers are validated and normalized while decoding, so a decoded
/// event can be mapped to cache addresses without further checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum DomainEvent {
    ChainUpdate {
        chain_id: ChainId,
    },
    SafeAppsUpdate {
        chain_id: ChainId,
    },
    PendingMultisigTransaction {
        chain_id: ChainId,
        address: Address,
        safe_tx_hash: TxHash,
    },
    DeletedMultisigTransaction {
        chain_id: ChainId,
        address: Address,
        safe_tx_hash: TxHash,
    },
    ExecutedMultisigTransaction {
        chain_id: ChainId,
        address: Address,
        safe_tx_hash: TxHash,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_hash: Option<TxHash>,
    },
    NewConfirmation {
        chain_id: ChainId,
        address: Address,
        owner: Address,
        safe_tx_hash: TxHash,
    },
    ModuleTransaction {
        chain_id: ChainId,
        address: Address,
        module: Address,
        tx_hash: TxHash,
    },
    IncomingEther {
        chain_id: ChainId,
        address: Address,
        tx_hash: TxHash,
        value: String,
    },
    OutgoingEther {
        chain_id: ChainId,
        address: Address,
        tx_hash: TxHash,
        value: String,
    },
    IncomingToken {
        chain_id: ChainId,
        address: Address,
        token_address: Address,
        tx_hash: TxHash,
    },
    OutgoingToken {
        chain_id: ChainId,
        address: Address,
        token_address: Address,
        tx_hash: TxHash,
    },
    MessageCreated {
        chain_id: ChainId,
        address: Address,
        message_hash: TxHash,
    },
    NewMessageConfirmation {
        chain_id: ChainId,
        address: Address,
        message_hash: TxHash,
    },
    SafeCreated {
        chain_id: ChainId,
        address: Address,
        block_number: u64,
    },
    ReorgDetected {
        chain_id: ChainId,
        block_number: u64,
    },
    NewDelegate {
        chain_id: ChainId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        safe_address: Option<Address>,
        delegate: Address,
        delegator: Address,
    },
    UpdatedDelegate {
        chain_id: ChainId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        safe_address: Option<Address>,
        delegate: Address,
        delegator: Address,
    },
    DeletedDelegate {
        chain_id: ChainId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        safe_address: Option<Address>,
        delegate: Address,
        delegator: Address,
    },
}

impl DomainEvent {
    /// Decode an event from a raw queue payload.
    ///
    /// Any payload that is not valid JSON, has an unknown `type`, misses a
    /// field or carries a malformed identifier is rejected with
    /// [`CoreError::MalformedEvent`].
    pub fn decode(payload: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(payload).map_err(|e| CoreError::malformed_event(e.to_string()))
    }

    /// Canonical JSON encoding (normalized identifiers, fixed field order).
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::ChainUpdate { .. } => EventType::ChainUpdate,
            DomainEvent::SafeAppsUpdate { .. } => EventType::SafeAppsUpdate,
            DomainEvent::PendingMultisigTransaction { .. } => EventType::PendingMultisigTransaction,
            DomainEvent::DeletedMultisigTransaction { .. } => EventType::DeletedMultisigTransaction,
            DomainEvent::ExecutedMultisigTransaction { .. } => {
                EventType::ExecutedMultisigTransaction
            }
            DomainEvent::NewConfirmation { .. } => EventType::NewConfirmation,
            DomainEvent::ModuleTransaction { .. } => EventType::ModuleTransaction,
            DomainEvent::IncomingEther { .. } => EventType::IncomingEther,
            DomainEvent::OutgoingEther { .. } => EventType::OutgoingEther,
            DomainEvent::IncomingToken { .. } => EventType::IncomingToken,
            DomainEvent::OutgoingToken { .. } => EventType::OutgoingToken,
            DomainEvent::MessageCreated { .. } => EventType::MessageCreated,
            DomainEvent::NewMessageConfirmation { .. } => EventType::NewMessageConfirmation,
            DomainEvent::SafeCreated { .. } => EventType::SafeCreated,
            DomainEvent::ReorgDetected { .. } => EventType::ReorgDetected,
            DomainEvent::NewDelegate { .. } => EventType::NewDelegate,
            DomainEvent::UpdatedDelegate { .. } => EventType::UpdatedDelegate,
            DomainEvent::DeletedDelegate { .. } => EventType::DeletedDelegate,
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        match self {
            DomainEvent::ChainUpdate { chain_id }
            | DomainEvent::SafeAppsUpdate { chain_id }
            | DomainEvent::PendingMultisigTransaction { chain_id, .. }
            | DomainEvent::DeletedMultisigTransaction { chain_id, .. }
            | DomainEvent::ExecutedMultisigTransaction { chain_id, .. }
            | DomainEvent::NewConfirmation { chain_id, .. }
            | DomainEvent::ModuleTransaction { chain_id, .. }
            | DomainEvent::IncomingEther { chain_id, .. }
            | DomainEvent::OutgoingEther { chain_id, .. }
            | DomainEvent::IncomingToken { chain_id, .. }
            | DomainEvent::OutgoingToken { chain_id, .. }
            | DomainEvent::MessageCreated { chain_id, .. }
            | DomainEvent::NewMessageConfirmation { chain_id, .. }
            | DomainEvent::SafeCreated { chain_id, .. }
            | DomainEvent::ReorgDetected { chain_id, .. }
            | DomainEvent::NewDelegate { chain_id, .. }
            | DomainEvent::UpdatedDelegate { chain_id, .. }
            | DomainEvent::DeletedDelegate { chain_id, .. } => chain_id,
        }
    }

    /// The safe this event concerns, if any.
    pub fn safe_address(&self) -> Option<&Address> {
        match self {
            DomainEvent::ChainUpdate { .. }
            | DomainEvent::SafeAppsUpdate { .. }
            | DomainEvent::ReorgDetected { .. } => None,
            DomainEvent::PendingMultisigTransaction { address, .. }
            | DomainEvent::DeletedMultisigTransaction { address, .. }
            | DomainEvent::ExecutedMultisigTransaction { address, .. }
            | DomainEvent::NewConfirmation { address, .. }
            | DomainEvent::ModuleTransaction { address, .. }
            | DomainEvent::IncomingEther { address, .. }
            | DomainEvent::OutgoingEther { address, .. }
            | DomainEvent::IncomingToken { address, .. }
            | DomainEvent::OutgoingToken { address, .. }
            | DomainEvent::MessageCreated { address, .. }
            | DomainEvent::NewMessageConfirmation { address, .. }
            | DomainEvent::SafeCreated { address, .. } => Some(address),
            DomainEvent::NewDelegate { safe_address, .. }
            | DomainEvent::UpdatedDelegate { safe_address, .. }
            | DomainEvent::DeletedDelegate { safe_address, .. } => safe_address.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFE: &str = "0xABCDEF0123456789abcdef0123456789abcdef01";

    fn hash(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    #[test]
    fn test_decode_executed_transaction() {
        let payload = serde_json::json!({
            "type": "EXECUTED_MULTISIG_TRANSACTION",
            "chainId": "1",
            "address": SAFE,
            "safeTxHash": hash("12"),
        });
        let event = DomainEvent::decode(payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.event_type(), EventType::ExecutedMultisigTransaction);
        assert_eq!(event.chain_id().as_str(), "1");
        assert_eq!(
            event.safe_address().unwrap().as_str(),
            SAFE.to_ascii_lowercase()
        );
        match event {
            DomainEvent::ExecutedMultisigTransaction { tx_hash, .. } => assert!(tx_hash.is_none()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = DomainEvent::decode(br#"{"type":"SOMETHING_ELSE","chainId":"1"}"#).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_rejects_missing_discriminator_and_garbage() {
        assert!(DomainEvent::decode(br#"{"chainId":"1"}"#).is_err());
        assert!(DomainEvent::decode(b"not json").is_err());
        assert!(DomainEvent::decode(b"").is_err());
    }

    #[test]
    fn test_decode_rejects_bad_identifiers() {
        assert!(DomainEvent::decode(br#"{"type":"CHAIN_UPDATE","chainId":"mainnet"}"#).is_err());
        let payload = serde_json::json!({
            "type": "PENDING_MULTISIG_TRANSACTION",
            "chainId": "1",
            "address": "0x1234",
            "safeTxHash": hash("ab"),
        });
        assert!(DomainEvent::decode(payload.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_delegate_without_safe() {
        let payload = serde_json::json!({
            "type": "NEW_DELEGATE",
            "chainId": "100",
            "delegate": SAFE,
            "delegator": SAFE,
        });
        let event = DomainEvent::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_type(), EventType::NewDelegate);
        assert!(event.safe_address().is_none());
    }

    #[test]
    fn test_canonical_json_is_stable_across_casing() {
        let upper = serde_json::json!({
            "type": "SAFE_CREATED",
            "chainId": "5",
            "address": SAFE,
            "blockNumber": 10,
        });
        let lower = serde_json::json!({
            "blockNumber": 10,
            "address": SAFE.to_ascii_lowercase(),
            "chainId": "5",
            "type": "SAFE_CREATED",
        });
        let a = DomainEvent::decode(upper.to_string().as_bytes()).unwrap();
        let b = DomainEvent::decode(lower.to_string().as_bytes()).unwrap();
        assert_eq!(a.to_canonical_json().unwrap(), b.to_canonical_json().unwrap());
    }

    #[test]
    fn test_event_type_names_match_wire_format() {
        let event = DomainEvent::ReorgDetected {
            chain_id: ChainId::from(1),
            block_number: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type().as_str());
        assert_eq!(json["blockNumber"], 7);
    }
}
