//! # sompi-core
//! Network parameters, addresses, scripts and the transaction codec for the
//! sompi HD wallet.

pub mod address;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod script;
pub mod types;

pub use address::Address;
pub use codec::{SigHashType, SignedTransaction, TransactionCodec, TransactionDraft};
pub use constants::{Network, NetworkParameters};
pub use crypto::{PrivateKey, PublicKey};
pub use error::{AddressError, CodecError, SigningError};
pub use script::ScriptPublicKey;
pub use types::{Transaction, TransactionId, TxInput, TxOutput, UnspentOutput, UtxoEntryRecord, UtxoId};
