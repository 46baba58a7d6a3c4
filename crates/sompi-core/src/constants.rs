//! Chain constants. All monetary values in sompi (1 KAS = 10^8 sompi).
//!
//! Nothing here is process-global: every component receives a
//! [`NetworkParameters`] value at construction.

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

pub const SOMPI_PER_KAS: u64 = 100_000_000;

/// BIP-44 coin type used in the derivation path.
pub const COIN_TYPE: u32 = 972;

/// Length of a subnetwork identifier in bytes.
pub const SUBNETWORK_ID_LEN: usize = 20;

/// Native (non-subnetwork) transactions use an all-zero subnetwork id.
pub const SUBNETWORK_ID_NATIVE: [u8; SUBNETWORK_ID_LEN] = [0u8; SUBNETWORK_ID_LEN];

/// Length of the serialized payload hash placeholder.
pub const PAYLOAD_HASH_LEN: usize = 33;

/// Network type: selects the address prefix.
///
/// # Examples
///
/// ```
/// use sompi_core::constants::Network;
/// assert_eq!(Network::Mainnet.prefix(), "kaspa");
/// assert_eq!(Network::Testnet.prefix(), "kaspatest");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Developer network.
    Devnet,
    /// Local simulation network.
    Simnet,
}

impl Network {
    /// Address prefix for this network.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Mainnet => "kaspa",
            Self::Testnet => "kaspatest",
            Self::Devnet => "kaspadev",
            Self::Simnet => "kaspasim",
        }
    }

    /// Look up a network from an address prefix.
    pub fn from_prefix(prefix: &str) -> Result<Self, AddressError> {
        match prefix {
            "kaspa" => Ok(Self::Mainnet),
            "kaspatest" => Ok(Self::Testnet),
            "kaspadev" => Ok(Self::Devnet),
            "kaspasim" => Ok(Self::Simnet),
            _ => Err(AddressError::UnknownPrefix(prefix.to_string())),
        }
    }
}

/// Per-network constants shared by every wallet component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    /// Network selecting the address prefix.
    pub network: Network,
    /// Transaction version written into every composed transaction.
    pub tx_version: i32,
    /// Subnetwork id written into every composed transaction.
    pub subnetwork_id: [u8; SUBNETWORK_ID_LEN],
    /// Confirmations required before a coinbase output is spendable.
    pub coinbase_maturity: u64,
    /// Confirmations required before a regular output is spendable.
    pub confirmation_depth: u64,
    /// A pending output removed within this many blue-score units of the tip
    /// is logged as moved rather than spent.
    pub moved_window: u64,
    /// Minimum relay fee per serialized byte.
    pub fee_per_byte: u64,
    /// Mass charged per serialized byte.
    pub mass_per_byte: u64,
    /// Mass charged per signature operation.
    pub mass_per_sig_op: u64,
    /// Fixed mass charged once per transaction.
    pub mass_overhead: u64,
    /// Upper bound on aggregate input mass for consolidation sends.
    pub max_consolidation_mass: u64,
    /// Change below this amount is folded into the fee.
    pub dust_threshold: u64,
}

impl NetworkParameters {
    /// Default parameters for a network.
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            tx_version: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE,
            coinbase_maturity: 100,
            confirmation_depth: 10,
            moved_window: 70,
            fee_per_byte: 1,
            mass_per_byte: 1,
            mass_per_sig_op: 1000,
            mass_overhead: 100,
            max_consolidation_mass: 100_000,
            dust_threshold: 600,
        }
    }

    /// Confirmations an output needs before it counts as confirmed.
    pub fn required_confirmations(&self, is_coinbase: bool) -> u64 {
        if is_coinbase {
            self.coinbase_maturity
        } else {
            self.confirmation_depth
        }
    }
}

impl Default for NetworkParameters {
    fn default() -> Self {
        Self::for_network(Network::default())
    }
}
