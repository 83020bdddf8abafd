//! Escrow program error codes (spec §4.3, §7). Numbered from 6000 as the
//! spec requires, with symbolic names matching the checks in
//! `settle_offline_payment` one-to-one.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProgramError {
    #[error("bundle id length must be between 1 and 128 bytes")]
    InvalidBundleId = 6000,
    #[error("attestation proof is invalid, stale, or fails signature verification")]
    InvalidAttestation = 6001,
    #[error("bundle hash already present in the payer's recent-hashes ring")]
    DuplicateBundle = 6002,
    #[error("nonce is not strictly greater than the registry's and escrow's last settled nonce")]
    InvalidNonce = 6003,
    #[error("amount must be greater than zero")]
    InvalidAmount = 6004,
    #[error("escrow balance is insufficient for the requested amount")]
    InsufficientFunds = 6005,
    #[error("escrow already exists for this owner")]
    EscrowAlreadyExists = 6007,
    #[error("escrow account does not exist for this owner")]
    EscrowNotFound = 6008,
    #[error("nonce registry does not exist for this owner")]
    NonceRegistryNotFound = 6009,
    #[error("checked arithmetic overflowed")]
    Overflow = 6010,
    #[error("checked arithmetic underflowed")]
    Underflow = 6011,
    #[error("fraud report references a hash already present in settled bundle history")]
    FraudEvidenceExists = 6012,
    #[error("fraud report hash already recorded")]
    FraudHashMatches = 6013,
    #[error("token transfer failed")]
    TransferFailed = 6014,
    #[error("automatic migration from the legacy account layout is not supported; submit migrate_escrow explicitly")]
    MigrationRequired = 6015,
}

impl ProgramError {
    /// The numeric error code exposed to callers (spec §6: "Errors are
    /// numeric codes >= 6000 with symbolic names").
    pub fn code(self) -> u32 {
        self as u32
    }
}

pub type ProgramResult<T> = Result<T, ProgramError>;
