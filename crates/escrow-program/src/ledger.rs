//! The `Ledger` trait abstracts the runtime the escrow program executes in,
//! per spec §1 ("The language/runtime it executes in is deliberately
//! abstracted"). A real deployment backs this with whatever account model
//! and token-transfer primitive its chain provides; this crate ships only
//! an in-memory reference implementation, used by the scenario tests in
//! `instructions` and by `bundle-engine`'s settlement worker in tests.

use crate::errors::{ProgramError, ProgramResult};
use crate::state::{EscrowAccount, NonceRegistry};
use offline_pay_types::PublicKey;
use std::collections::HashMap;

/// Accessor/mutator surface over escrow and nonce-registry accounts, plus
/// the trusted token-transfer primitive (spec §4.3 step 8).
pub trait Ledger {
    fn get_escrow(&self, owner: &PublicKey) -> Option<EscrowAccount>;
    fn put_escrow(&mut self, account: EscrowAccount);

    fn get_nonce_registry(&self, owner: &PublicKey) -> Option<NonceRegistry>;
    fn put_nonce_registry(&mut self, registry: NonceRegistry);

    /// Moves `amount` from `from` to `to` token accounts. Callers (e.g.
    /// `settle_offline_payment` step 7) already check the business-level
    /// escrow balance before reaching this call, so a failure here
    /// represents the token-transfer primitive itself rejecting the
    /// movement and is reported as `ProgramError::TransferFailed`, not
    /// `InsufficientFunds`.
    fn transfer_tokens(&mut self, from: [u8; 32], to: [u8; 32], amount: u64) -> ProgramResult<()>;
}

/// Reference in-memory ledger for tests and for standalone simulation of
/// the escrow program without a real chain underneath.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    escrows: HashMap<[u8; 32], EscrowAccount>,
    registries: HashMap<[u8; 32], NonceRegistry>,
    token_balances: HashMap<[u8; 32], u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: credits a token account directly (standing in
    /// for a prior mint or external transfer into the owner's wallet).
    pub fn credit_token_account(&mut self, account: [u8; 32], amount: u64) {
        *self.token_balances.entry(account).or_insert(0) += amount;
    }

    pub fn token_balance(&self, account: [u8; 32]) -> u64 {
        *self.token_balances.get(&account).unwrap_or(&0)
    }
}

impl Ledger for InMemoryLedger {
    fn get_escrow(&self, owner: &PublicKey) -> Option<EscrowAccount> {
        self.escrows.get(owner.as_bytes()).cloned()
    }

    fn put_escrow(&mut self, account: EscrowAccount) {
        self.escrows.insert(*account.owner.as_bytes(), account);
    }

    fn get_nonce_registry(&self, owner: &PublicKey) -> Option<NonceRegistry> {
        self.registries.get(owner.as_bytes()).cloned()
    }

    fn put_nonce_registry(&mut self, registry: NonceRegistry) {
        self.registries.insert(*registry.owner.as_bytes(), registry);
    }

    fn transfer_tokens(&mut self, from: [u8; 32], to: [u8; 32], amount: u64) -> ProgramResult<()> {
        let from_balance = self.token_balances.entry(from).or_insert(0);
        *from_balance = from_balance
            .checked_sub(amount)
            .ok_or(ProgramError::TransferFailed)?;
        *self.token_balances.entry(to).or_insert(0) += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_balance_between_accounts() {
        let mut ledger = InMemoryLedger::new();
        ledger.credit_token_account([1u8; 32], 100);
        ledger.transfer_tokens([1u8; 32], [2u8; 32], 40).unwrap();
        assert_eq!(ledger.token_balance([1u8; 32]), 60);
        assert_eq!(ledger.token_balance([2u8; 32]), 40);
    }

    #[test]
    fn transfer_rejects_when_source_balance_is_insufficient() {
        let mut ledger = InMemoryLedger::new();
        ledger.credit_token_account([1u8; 32], 10);
        let result = ledger.transfer_tokens([1u8; 32], [2u8; 32], 20);
        assert_eq!(result, Err(ProgramError::TransferFailed));
    }
}
