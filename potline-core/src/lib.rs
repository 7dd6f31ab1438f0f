//! Potline core - custodial settlement engine for a UTXO wagering game.
//!
//! Players deposit to per-seat addresses derived from one master secret; at
//! game end the engine aggregates those deposits, builds one deterministic
//! settlement transaction, signs it with every contributing seat's key and
//! submits it once. Payouts move the pot to winners, refunds return deposits
//! to depositors.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod secret;
pub mod settle;
pub mod storage;
pub mod txbuild;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use aggregate::{Aggregate, UtxoAggregator};
pub use config::{EngineConfig, FeePolicy};
pub use error::{EngineError, Result};
pub use keys::{DerivedKeypair, KeyService};
pub use ledger::{EsploraLedger, LedgerQuery};
pub use settle::SettlementOrchestrator;
pub use storage::{SettlementStore, Storage};
pub use txbuild::{TransactionBuilder, UnsignedSettlement};
pub use types::{
    Depositor, FundUnit, PayoutDraft, PayoutInstruction, SettlementKind, SettlementRecord,
    SettlementState, SpendableSet,
};

pub use bitcoin::Amount;
pub use bitcoin::Network;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeLedger;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_engine_construction() {
        let keys = Arc::new(KeyService::new(Network::Regtest));
        keys.load_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap();

        let ledger = Arc::new(FakeLedger::new()) as Arc<dyn LedgerQuery>;
        let orchestrator =
            SettlementOrchestrator::new(EngineConfig::default(), ledger, keys, None);
        assert!(orchestrator.is_ok());
    }
}
