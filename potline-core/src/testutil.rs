//! In-memory ledger fake for builder/orchestrator tests.

use crate::error::{EngineError, Result};
use crate::ledger::LedgerQuery;
use crate::types::{FundUnit, SpendableSet};

use async_trait::async_trait;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use parking_lot::Mutex;
use std::collections::HashMap;

pub(crate) fn fake_txid(tag: u8) -> Txid {
    Txid::from_raw_hash(sha256d::Hash::from_byte_array([tag; 32]))
}

pub(crate) fn fake_unit(address: &Address, tag: u8, sats: u64) -> FundUnit {
    FundUnit {
        outpoint: OutPoint {
            txid: fake_txid(tag),
            vout: 0,
        },
        owner_address: address.to_string(),
        amount: Amount::from_sat(sats),
        is_coinbase: false,
        block_height: 100,
    }
}

pub(crate) struct FakeLedger {
    spendable: Mutex<HashMap<String, SpendableSet>>,
    pub submitted: Mutex<Vec<Transaction>>,
    fail_submit: Mutex<bool>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            spendable: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            fail_submit: Mutex::new(false),
        }
    }

    pub fn fund(&self, address: &Address, units: Vec<FundUnit>) {
        let total = units.iter().map(|u| u.amount).sum::<Amount>();
        self.spendable
            .lock()
            .insert(address.to_string(), SpendableSet { units, total });
    }

    pub fn fail_submissions(&self) {
        *self.fail_submit.lock() = true;
    }
}

#[async_trait]
impl LedgerQuery for FakeLedger {
    async fn get_spendable_units(&self, address: &Address) -> Result<SpendableSet> {
        Ok(self
            .spendable
            .lock()
            .get(&address.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_current_height(&self) -> Result<u64> {
        Ok(100)
    }

    async fn submit(&self, tx: &Transaction) -> Result<Txid> {
        if *self.fail_submit.lock() {
            return Err(EngineError::transport("fake: submission rejected"));
        }
        self.submitted.lock().push(tx.clone());
        Ok(tx.compute_txid())
    }
}
