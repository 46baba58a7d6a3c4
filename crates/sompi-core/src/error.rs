//! Error types for addresses and the transaction codec.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("unknown prefix: {0}")] UnknownPrefix(String),
    #[error("missing separator")] MissingSeparator,
    #[error("invalid length")] InvalidLength,
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid version: {0}")] InvalidVersion(u8),
    #[error("invalid padding bits")] InvalidPadding,
    #[error("mixed case")] MixedCase,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("no inputs selected")] NoInputs,
    #[error("inputs {available} do not cover amount plus fee {required}")] InsufficientInputs { available: u64, required: u64 },
    #[error("value overflow")] ValueOverflow,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
    #[error("unknown sighash type: {0:#x}")] UnknownSigHashType(u32),
    #[error("malformed script: {0}")] MalformedScript(String),
    #[error("invalid transaction id: {0}")] InvalidTransactionId(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("no private key for address {0}")] MissingKey(String),
    #[error("SIGHASH_SINGLE input {index} has no matching output ({outputs} outputs)")] SingleOutOfRange { index: usize, outputs: usize },
    #[error("invalid private key")] InvalidPrivateKey,
    #[error("invalid public key")] InvalidPublicKey,
    #[error("invalid signature")] InvalidSignature,
    #[error("signature verification failed on input {0}")] VerificationFailed(usize),
    #[error(transparent)] Codec(#[from] CodecError),
}
