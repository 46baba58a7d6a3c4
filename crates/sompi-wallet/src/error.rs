//! Wallet error types.

use sompi_core::error::{AddressError, CodecError, SigningError};
use thiserror::Error;

/// Errors raised by a ledger service implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Transport-level failure; nothing reached the service.
    #[error("connection: {0}")]
    Connection(String),

    /// The service rejected a well-formed request.
    #[error("protocol error {code}: {message}")]
    Protocol {
        /// Service error code.
        code: i64,
        /// Message reported by the service, verbatim.
        message: String,
    },
}

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Spendable balance cannot cover the request.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the selection had to reach, in sompi.
        requested: u64,
        /// Spendable confirmed balance, in sompi.
        available: u64,
    },

    /// Automatic fee calculation exceeded the caller's ceiling.
    #[error("fee {fee} exceeds maximum {max}")]
    FeeExceeded { fee: u64, max: u64 },

    /// Fixed priority fee is below the network minimum.
    #[error("insufficient fee: required {required}, provided {provided}")]
    InsufficientFee { required: u64, provided: u64 },

    /// Signing failed; the ledger and key state disagree.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Transport-level failure talking to the ledger service.
    #[error("rpc connection: {0}")]
    RpcConnection(String),

    /// The ledger service rejected the request.
    #[error("rpc error {code}: {message}")]
    RpcProtocol { code: i64, message: String },

    /// A sync was requested while an incompatible one is running.
    #[error("sync conflict: a sync is already in progress or the wallet is subscribed")]
    SyncConflict,

    /// The operation needs a ledger service and none is configured.
    #[error("no ledger service configured")]
    MissingServiceProvider,

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid address string.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Wrong password for an encrypted export.
    #[error("invalid password")]
    InvalidPassword,

    /// Encrypted blob is truncated or malformed.
    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Secret or cache persistence failure.
    #[error("storage: {0}")]
    Storage(String),

    /// Transaction composition failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<ServiceError> for WalletError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Connection(msg) => Self::RpcConnection(msg),
            ServiceError::Protocol { code, message } => Self::RpcProtocol { code, message },
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
