use crate::error::{EngineError, Result};
use crate::types::{FundUnit, SpendableSet};

use async_trait::async_trait;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};

/// The four ledger operations the engine actually needs, behind one narrow
/// trait. Implementations are explicit, dependency-injected instances owned
/// by the orchestrator; transport and validation errors propagate to the
/// caller, never retried here (a blind retry risks duplicate submissions).
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// All confirmed, unspent outputs locked to `address`.
    async fn get_spendable_units(&self, address: &Address) -> Result<SpendableSet>;

    async fn get_current_height(&self) -> Result<u64>;

    /// Relay a fully signed transaction; returns its txid for audit.
    async fn submit(&self, tx: &Transaction) -> Result<Txid>;
}

/// Esplora-backed ledger adapter.
pub struct EsploraLedger {
    client: esplora_client::AsyncClient,
}

impl EsploraLedger {
    pub fn new(url: &str) -> Result<Self> {
        let client = esplora_client::Builder::new(url)
            .build_async()
            .map_err(|e| EngineError::transport(format!("Failed to create esplora client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LedgerQuery for EsploraLedger {
    async fn get_spendable_units(&self, address: &Address) -> Result<SpendableSet> {
        let script_pubkey = address.script_pubkey();

        let txs = self
            .client
            .scripthash_txs(&script_pubkey, None)
            .await
            .map_err(|e| EngineError::transport(format!("Failed to get transactions: {}", e)))?;

        let mut units = Vec::new();
        let mut total = Amount::ZERO;

        for tx in txs {
            if !tx.status.confirmed {
                // a FundUnit only exists once its deposit has confirmed
                continue;
            }

            let is_coinbase = tx.vin.first().map(|vin| vin.is_coinbase).unwrap_or(false);

            for (vout, output) in tx.vout.iter().enumerate() {
                if output.scriptpubkey != script_pubkey {
                    continue;
                }

                let is_spent = match self.client.get_output_status(&tx.txid, vout as u64).await {
                    Ok(Some(status)) => status.spent,
                    Ok(None) => false,
                    Err(_) => false, // Assume unspent if we can't check
                };

                if !is_spent {
                    let amount = Amount::from_sat(output.value);
                    units.push(FundUnit {
                        outpoint: OutPoint {
                            txid: tx.txid,
                            vout: vout as u32,
                        },
                        owner_address: address.to_string(),
                        amount,
                        is_coinbase,
                        block_height: tx.status.block_height.unwrap_or(0) as u64,
                    });
                    total += amount;
                }
            }
        }

        Ok(SpendableSet { units, total })
    }

    async fn get_current_height(&self) -> Result<u64> {
        let height = self
            .client
            .get_height()
            .await
            .map_err(|e| EngineError::transport(format!("Failed to get height: {}", e)))?;
        Ok(height as u64)
    }

    async fn submit(&self, tx: &Transaction) -> Result<Txid> {
        self.client
            .broadcast(tx)
            .await
            .map_err(|e| EngineError::transport(format!("Broadcast failed: {}", e)))?;

        let txid = tx.compute_txid();
        tracing::info!("Submitted settlement transaction {}", txid);
        Ok(txid)
    }
}
