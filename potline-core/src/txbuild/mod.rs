use crate::config::FeePolicy;
use crate::error::{EngineError, Result};
use crate::keys::DerivedKeypair;
use crate::types::{FundUnit, PayoutInstruction};

use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    ecdsa, Address, Amount, EcdsaSighashType, Network, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Witness,
};
use std::collections::HashMap;

/// A balanced, not-yet-signed settlement transaction. `consumed` is in the
/// same order as `tx.input`.
#[derive(Debug, Clone)]
pub struct UnsignedSettlement {
    pub tx: Transaction,
    pub consumed: Vec<FundUnit>,
    pub fee: Amount,
    pub change: Amount,
}

/// Builds and signs settlement transactions.
///
/// Building is deterministic: the same inputs, outputs and policy always
/// produce a byte-identical unsigned transaction (stable input and output
/// ordering), so settled rounds can be reproduced in audits and tests.
pub struct TransactionBuilder {
    network: Network,
    secp: Secp256k1<All>,
}

impl TransactionBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            secp: Secp256k1::new(),
        }
    }

    pub fn flat_fee(policy: &FeePolicy, priority: bool) -> Amount {
        let surcharge = if priority {
            policy.priority_surcharge_sats
        } else {
            0
        };
        Amount::from_sat(policy.base_fee_sats + surcharge)
    }

    /// Where change and the house cut go. An unset or wrong-network treasury
    /// address falls back to the caller-supplied secondary (a contributing
    /// seat address) instead of stranding the settlement on a misconfig;
    /// the fallback is logged loudly so operators notice the misrouted cut.
    pub fn resolve_change_address(&self, primary: Option<&str>, fallback: &Address) -> Address {
        if let Some(raw) = primary {
            match raw.parse::<Address<NetworkUnchecked>>() {
                Ok(parsed) => match parsed.require_network(self.network) {
                    Ok(address) => return address,
                    Err(e) => tracing::warn!(
                        "Treasury address {} is not valid for {:?}, routing change to {} instead: {}",
                        raw,
                        self.network,
                        fallback,
                        e
                    ),
                },
                Err(e) => tracing::warn!(
                    "Treasury address {} does not parse, routing change to {} instead: {}",
                    raw,
                    fallback,
                    e
                ),
            }
        }
        fallback.clone()
    }

    /// Build one balanced transaction spending `inputs` into `outputs` plus
    /// fee; anything left over above the dust limit becomes a change output,
    /// dust is absorbed into the fee.
    pub fn build(
        &self,
        inputs: Vec<FundUnit>,
        outputs: &[PayoutInstruction],
        change_address: &Address,
        policy: &FeePolicy,
        priority: bool,
    ) -> Result<UnsignedSettlement> {
        if inputs.is_empty() {
            return Err(EngineError::invalid_argument(
                "Cannot build a settlement with no inputs",
            ));
        }
        if outputs.is_empty() {
            return Err(EngineError::invalid_argument(
                "Cannot build a settlement with no outputs",
            ));
        }

        let fee = Self::flat_fee(policy, priority).to_sat();
        let available: u64 = inputs.iter().map(|u| u.amount.to_sat()).sum();
        let payout: u64 = outputs.iter().map(|o| o.amount.to_sat()).sum();
        let need = payout + fee;

        if available < need {
            return Err(EngineError::InsufficientFunds { need, available });
        }

        let mut consumed = inputs;
        consumed.sort_by_key(|u| u.outpoint);

        let mut instructions = outputs.to_vec();
        instructions.sort_by(|a, b| {
            a.recipient_address
                .cmp(&b.recipient_address)
                .then(a.amount.cmp(&b.amount))
        });

        let mut tx_outputs = Vec::with_capacity(instructions.len() + 1);
        for instruction in &instructions {
            tx_outputs.push(TxOut {
                value: instruction.amount,
                script_pubkey: self.parse_address(&instruction.recipient_address)?.script_pubkey(),
            });
        }

        let leftover = available - need;
        let mut change = Amount::ZERO;
        if leftover >= policy.dust_limit_sats {
            change = Amount::from_sat(leftover);
            tx_outputs.push(TxOut {
                value: change,
                script_pubkey: change_address.script_pubkey(),
            });
        } else if leftover > 0 {
            tracing::debug!("Absorbing {} sats of dust change into the fee", leftover);
        }

        let tx_inputs = consumed
            .iter()
            .map(|unit| TxIn {
                previous_output: unit.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            })
            .collect();

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: tx_inputs,
            output: tx_outputs,
        };

        Ok(UnsignedSettlement {
            tx,
            consumed,
            fee: Amount::from_sat(available - payout - change.to_sat()),
            change,
        })
    }

    /// Sign every input with the key matching its locking script. All inputs
    /// are matched to keys before any signature is produced, so a mismatch
    /// fails with `IncompleteSignature` and leaves nothing half-signed.
    pub fn sign(
        &self,
        unsigned: &UnsignedSettlement,
        keys_by_address: &HashMap<String, DerivedKeypair>,
    ) -> Result<Transaction> {
        let mut plan = Vec::with_capacity(unsigned.consumed.len());
        for unit in &unsigned.consumed {
            let derived = keys_by_address.get(&unit.owner_address).ok_or_else(|| {
                EngineError::incomplete_signature(format!(
                    "No signing key for input {} locked to {}",
                    unit.outpoint, unit.owner_address
                ))
            })?;
            plan.push((unit, derived, derived.address.script_pubkey()));
        }

        let mut tx = unsigned.tx.clone();
        let mut cache = SighashCache::new(&mut tx);

        for (index, (unit, derived, script)) in plan.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(index, script, unit.amount, EcdsaSighashType::All)
                .map_err(|e| {
                    EngineError::incomplete_signature(format!(
                        "Sighash computation failed for input {}: {}",
                        index, e
                    ))
                })?;

            let message = Message::from_digest(sighash.to_byte_array());
            let signature = ecdsa::Signature {
                signature: self.secp.sign_ecdsa(&message, &derived.keypair.secret_key()),
                sighash_type: EcdsaSighashType::All,
            };

            let witness = cache.witness_mut(index).ok_or_else(|| {
                EngineError::incomplete_signature(format!("No witness slot for input {}", index))
            })?;
            *witness = Witness::p2wpkh(&signature, &derived.public_key);
        }

        drop(cache);
        Ok(tx)
    }

    fn parse_address(&self, raw: &str) -> Result<Address> {
        raw.parse::<Address<NetworkUnchecked>>()
            .map_err(|e| EngineError::invalid_address(format!("{}: {}", raw, e)))?
            .require_network(self.network)
            .map_err(|e| EngineError::invalid_address(format!("{}: {}", raw, e)))
    }
}
