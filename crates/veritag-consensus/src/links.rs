//! Proof link construction.
//!
//! Pure formatting of explorer and mirror URIs for confirmed transactions
//! and topics. No state and no network I/O; only input-format validation
//! can fail.

use std::fmt;

use serde::{Deserialize, Serialize};
use veritag_core::{TopicId, TransactionId};

use crate::error::{ConsensusError, Result};

/// Consensus network a proof link points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    Testnet,
    /// Preview network for upcoming releases.
    Previewnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Previewnet => write!(f, "previewnet"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "previewnet" => Ok(Self::Previewnet),
            _ => Err(ConsensusError::validation(format!("unknown network {s:?}"))),
        }
    }
}

/// Dereferenceable evidence URIs for a confirmed attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofLinks {
    /// Explorer page for the transaction.
    pub transaction_uri: String,

    /// Mirror API listing for the topic's messages.
    pub topic_uri: String,
}

impl ProofLinks {
    /// Builds proof links from raw identifier strings.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Validation` if either identifier is
    /// malformed.
    pub fn build(transaction_id: &str, topic_id: &str, network: Network) -> Result<Self> {
        let transaction = TransactionId::parse(transaction_id)?;
        let topic = TopicId::parse(topic_id)?;
        Ok(Self::for_ids(&transaction, &topic, network))
    }

    /// Builds proof links from already-validated identifiers.
    pub fn for_ids(transaction_id: &TransactionId, topic_id: &TopicId, network: Network) -> Self {
        Self {
            transaction_uri: format!(
                "https://{network}.ledgerscan.io/transaction/{transaction_id}"
            ),
            topic_uri: format!(
                "https://mirror.{network}.ledgerscan.io/api/v1/topics/{topic_id}/messages"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_uris_for_each_network() {
        let links =
            ProofLinks::build("0.0.1234@1700000000.000000001", "0.0.48211", Network::Testnet)
                .unwrap();

        assert_eq!(
            links.transaction_uri,
            "https://testnet.ledgerscan.io/transaction/0.0.1234@1700000000.000000001"
        );
        assert_eq!(
            links.topic_uri,
            "https://mirror.testnet.ledgerscan.io/api/v1/topics/0.0.48211/messages"
        );

        let mainnet =
            ProofLinks::build("0.0.1234@1700000000.000000001", "0.0.48211", Network::Mainnet)
                .unwrap();
        assert!(mainnet.transaction_uri.contains("mainnet"));
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!(ProofLinks::build("not-a-tx", "0.0.48211", Network::Testnet).is_err());
        assert!(
            ProofLinks::build("0.0.1234@1700000000.000000001", "topic", Network::Testnet).is_err()
        );
    }

    #[test]
    fn network_parses_from_config_strings() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!("devnet".parse::<Network>().is_err());
    }
}
