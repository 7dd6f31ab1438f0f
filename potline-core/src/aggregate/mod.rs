use crate::error::Result;
use crate::keys::{seat_identifier, DerivedKeypair, KeyService};
use crate::ledger::LedgerQuery;
use crate::types::{FundUnit, SpendableSet};

use bitcoin::{Address, Amount};
use std::collections::HashMap;
use std::sync::Arc;

/// Combined spendable funds across many deposit addresses, together with the
/// signing key for every address that contributed units.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub units: Vec<FundUnit>,
    pub keys_by_address: HashMap<String, DerivedKeypair>,
    pub total: Amount,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Collects spendable outputs across a set of derived addresses.
///
/// "No funds available" is a normal terminal state, not a fault: an empty
/// `Aggregate` comes back, never an error.
pub struct UtxoAggregator {
    ledger: Arc<dyn LedgerQuery>,
    keys: Arc<KeyService>,
}

impl UtxoAggregator {
    pub fn new(ledger: Arc<dyn LedgerQuery>, keys: Arc<KeyService>) -> Self {
        Self { ledger, keys }
    }

    pub async fn fetch_spendable(&self, address: &Address) -> Result<SpendableSet> {
        let set = self.ledger.get_spendable_units(address).await?;
        tracing::debug!(
            "{}: {} spendable units, {} sats",
            address,
            set.units.len(),
            set.total.to_sat()
        );
        Ok(set)
    }

    /// Query every identifier's address and accumulate the combined input
    /// set. Addresses are independent, so the queries run concurrently;
    /// addresses with nothing spendable are skipped.
    pub async fn aggregate_for_identifiers(&self, identifiers: &[String]) -> Result<Aggregate> {
        let derived = identifiers
            .iter()
            .map(|id| self.keys.derive_for_identifier(id))
            .collect::<Result<Vec<_>>>()?;

        let queries = derived
            .iter()
            .map(|d| self.ledger.get_spendable_units(&d.address));
        let sets = futures::future::try_join_all(queries).await?;

        let mut units = Vec::new();
        let mut keys_by_address = HashMap::new();
        let mut total = Amount::ZERO;

        for (keypair, set) in derived.into_iter().zip(sets) {
            if set.is_empty() {
                continue;
            }
            total += set.total;
            units.extend(set.units);
            keys_by_address.insert(keypair.address.to_string(), keypair);
        }

        tracing::info!(
            "Aggregated {} sats in {} units across {} of {} addresses",
            total.to_sat(),
            units.len(),
            keys_by_address.len(),
            identifiers.len()
        );

        Ok(Aggregate {
            units,
            keys_by_address,
            total,
        })
    }

    /// Aggregate across every seat address of a room.
    pub async fn aggregate_for_seats(&self, room_id: &str, seat_count: u32) -> Result<Aggregate> {
        let identifiers: Vec<String> = (0..seat_count)
            .map(|seat| seat_identifier(room_id, seat))
            .collect();
        self.aggregate_for_identifiers(&identifiers).await
    }
}
