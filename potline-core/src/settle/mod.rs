use crate::aggregate::{Aggregate, UtxoAggregator};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::keys::KeyService;
use crate::ledger::LedgerQuery;
use crate::storage::{SettlementStore, Storage};
use crate::txbuild::TransactionBuilder;
use crate::types::{
    Depositor, PayoutDraft, PayoutInstruction, SettlementKind, SettlementRecord, SettlementState,
};

use bitcoin::{Address, Amount, Txid};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Minor units per display unit of the game currency.
pub const MINOR_UNITS_PER_DISPLAY: u64 = 100_000_000;

/// Display units to minor units, flooring. Never rounds up: rounding in the
/// house's favor is the only acceptable direction when paying out.
pub fn display_to_minor(amount_display: f64) -> Amount {
    Amount::from_sat((amount_display * MINOR_UNITS_PER_DISPLAY as f64).floor() as u64)
}

/// Drives payout and refund settlement events.
///
/// Each event is one atomic aggregate-build-sign-submit sequence with no
/// intermediate persisted signing state. Failures are terminal for the
/// event; the caller decides whether to start a fresh event, which will
/// re-aggregate UTXOs (stale units are never reused after a failed
/// submission). Serializing concurrent settlements for the same room is the
/// caller's contract.
pub struct SettlementOrchestrator {
    config: EngineConfig,
    ledger: Arc<dyn LedgerQuery>,
    aggregator: UtxoAggregator,
    builder: TransactionBuilder,
    storage: Option<Arc<Storage>>,
}

impl SettlementOrchestrator {
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn LedgerQuery>,
        keys: Arc<KeyService>,
        storage: Option<Arc<Storage>>,
    ) -> Result<Self> {
        config.validate()?;

        let aggregator = UtxoAggregator::new(ledger.clone(), keys);
        let builder = TransactionBuilder::new(config.network);

        Ok(Self {
            config,
            ledger,
            aggregator,
            builder,
            storage,
        })
    }

    /// Pay the given instructions out of the room's seat deposits. Payouts
    /// carry the priority surcharge so winners are not left waiting on a
    /// congested mempool.
    pub async fn payout(
        &self,
        room_id: &str,
        seat_count: u32,
        drafts: &[PayoutDraft],
    ) -> Result<Txid> {
        if drafts.is_empty() {
            return Err(EngineError::invalid_argument(
                "Payout requires at least one instruction",
            ));
        }
        let instructions = drafts
            .iter()
            .map(draft_to_instruction)
            .collect::<Result<Vec<_>>>()?;

        let mut record = SettlementRecord::new(room_id, SettlementKind::Payout);
        self.save_record(&record).await?;

        match self
            .run_payout(room_id, seat_count, &instructions, &mut record)
            .await
        {
            Ok(txid) => Ok(txid),
            Err(e) => {
                self.fail_record(&mut record, &e).await;
                Err(e)
            }
        }
    }

    async fn run_payout(
        &self,
        room_id: &str,
        seat_count: u32,
        instructions: &[PayoutInstruction],
        record: &mut SettlementRecord,
    ) -> Result<Txid> {
        let aggregate = self
            .aggregator
            .aggregate_for_seats(room_id, seat_count)
            .await?;
        if aggregate.is_empty() {
            return Err(EngineError::NoFunds);
        }

        let change_address = self.change_address(&aggregate)?;
        let unsigned = self.builder.build(
            aggregate.units.clone(),
            instructions,
            &change_address,
            &self.config.fee_policy,
            true,
        )?;
        self.transition(record, SettlementState::Built, None).await?;

        let signed = self.builder.sign(&unsigned, &aggregate.keys_by_address)?;
        self.transition(record, SettlementState::Signed, None).await?;

        let txid = self.ledger.submit(&signed).await?;
        self.transition(record, SettlementState::Submitted, Some(txid))
            .await?;

        tracing::info!(
            "Payout for room {} submitted as {} ({} outputs, {} sats fee)",
            room_id,
            txid,
            instructions.len(),
            unsigned.fee.to_sat()
        );
        Ok(txid)
    }

    /// Return seat deposits to their depositors, split evenly after a fee
    /// buffer. Only depositors who supplied a withdrawal address and whose
    /// deposit confirmed are eligible; a refund that would produce
    /// zero-value outputs is abandoned with an empty result rather than
    /// submitted.
    pub async fn refund(
        &self,
        room_id: &str,
        seat_count: u32,
        depositors: &[Depositor],
    ) -> Result<Vec<Txid>> {
        let eligible: Vec<&Depositor> = depositors.iter().filter(|d| d.is_refundable()).collect();
        if eligible.is_empty() {
            tracing::info!("Refund for room {}: no eligible depositors", room_id);
            return Ok(Vec::new());
        }

        let mut record = SettlementRecord::new(room_id, SettlementKind::Refund);
        self.save_record(&record).await?;

        match self
            .run_refund(room_id, seat_count, &eligible, &mut record)
            .await
        {
            Ok(txids) => Ok(txids),
            Err(e) => {
                self.fail_record(&mut record, &e).await;
                Err(e)
            }
        }
    }

    async fn run_refund(
        &self,
        room_id: &str,
        seat_count: u32,
        eligible: &[&Depositor],
        record: &mut SettlementRecord,
    ) -> Result<Vec<Txid>> {
        let aggregate = self
            .aggregator
            .aggregate_for_seats(room_id, seat_count)
            .await?;
        if aggregate.is_empty() {
            tracing::info!("Refund for room {}: nothing to refund", room_id);
            self.abandon_record(record, "no spendable deposits").await;
            return Ok(Vec::new());
        }

        let buffer = self.config.fee_policy.refund_fee_buffer_sats;
        let total = aggregate.total.to_sat();
        if total <= buffer {
            tracing::warn!(
                "Refund for room {} abandoned: {} sats aggregated does not cover the {} sat fee buffer",
                room_id,
                total,
                buffer
            );
            self.abandon_record(record, "total below fee buffer").await;
            return Ok(Vec::new());
        }

        let share = (total - buffer) / eligible.len() as u64;
        if share == 0 {
            tracing::warn!(
                "Refund for room {} abandoned: per-depositor share rounds to zero",
                room_id
            );
            self.abandon_record(record, "per-depositor share is zero")
                .await;
            return Ok(Vec::new());
        }

        // withdrawal_address presence is what made a depositor eligible
        let instructions: Vec<PayoutInstruction> = eligible
            .iter()
            .map(|d| PayoutInstruction {
                recipient_address: d.withdrawal_address.clone().expect("eligible depositor"),
                amount: Amount::from_sat(share),
            })
            .collect();

        let change_address = self.change_address(&aggregate)?;
        let unsigned = self.builder.build(
            aggregate.units.clone(),
            &instructions,
            &change_address,
            &self.config.fee_policy,
            false,
        )?;
        self.transition(record, SettlementState::Built, None).await?;

        let signed = self.builder.sign(&unsigned, &aggregate.keys_by_address)?;
        self.transition(record, SettlementState::Signed, None).await?;

        let txid = self.ledger.submit(&signed).await?;
        self.transition(record, SettlementState::Submitted, Some(txid))
            .await?;

        tracing::info!(
            "Refund for room {} submitted as {}: {} sats to each of {} depositors",
            room_id,
            txid,
            share,
            eligible.len()
        );
        Ok(vec![txid])
    }

    /// Called by the room layer's confirmation poller once a submitted
    /// settlement transaction has confirmed; the engine runs no background
    /// watchers of its own.
    pub async fn mark_confirmed(&self, event_id: Uuid) -> Result<()> {
        if let Some(storage) = &self.storage {
            SettlementStore::new(storage)
                .update_state(event_id, &SettlementState::Confirmed, None, None)
                .await?;
        }
        Ok(())
    }

    pub async fn events_for_room(&self, room_id: &str) -> Result<Vec<SettlementRecord>> {
        match &self.storage {
            Some(storage) => SettlementStore::new(storage).events_for_room(room_id).await,
            None => Ok(Vec::new()),
        }
    }

    fn change_address(&self, aggregate: &Aggregate) -> Result<Address> {
        let first = aggregate.units.first().ok_or(EngineError::NoFunds)?;
        let fallback = aggregate
            .keys_by_address
            .get(&first.owner_address)
            .map(|derived| derived.address.clone())
            .ok_or_else(|| {
                EngineError::internal("Aggregate is missing the key for a contributing address")
            })?;

        Ok(self
            .builder
            .resolve_change_address(self.config.treasury_address.as_deref(), &fallback))
    }

    async fn save_record(&self, record: &SettlementRecord) -> Result<()> {
        if let Some(storage) = &self.storage {
            SettlementStore::new(storage).record_event(record).await?;
        }
        Ok(())
    }

    async fn transition(
        &self,
        record: &mut SettlementRecord,
        state: SettlementState,
        txid: Option<Txid>,
    ) -> Result<()> {
        record.state = state;
        if let Some(txid) = txid {
            record.txid = Some(txid.to_string());
        }
        record.updated_at = Utc::now();
        tracing::debug!(
            "Settlement {} ({:?}) -> {:?}",
            record.id,
            record.kind,
            record.state
        );

        if let Some(storage) = &self.storage {
            SettlementStore::new(storage)
                .update_state(
                    record.id,
                    &record.state,
                    record.txid.as_deref(),
                    record.failure.as_deref(),
                )
                .await?;
        }
        Ok(())
    }

    /// Terminal failure. Recording must not mask the settlement error, so a
    /// store failure here is logged and swallowed.
    async fn fail_record(&self, record: &mut SettlementRecord, cause: &EngineError) {
        record.failure = Some(cause.to_string());
        if let Err(e) = self
            .transition(record, SettlementState::Failed, None)
            .await
        {
            tracing::warn!("Failed to record settlement failure: {}", e);
        }
    }

    /// Expected terminal outcome that attempted no transaction; recorded as
    /// Failed with the reason so audits can tell it apart from a submission.
    async fn abandon_record(&self, record: &mut SettlementRecord, reason: &str) {
        record.failure = Some(format!("abandoned: {}", reason));
        if let Err(e) = self
            .transition(record, SettlementState::Failed, None)
            .await
        {
            tracing::warn!("Failed to record abandoned settlement: {}", e);
        }
    }
}

fn draft_to_instruction(draft: &PayoutDraft) -> Result<PayoutInstruction> {
    if !draft.amount_display.is_finite() || draft.amount_display <= 0.0 {
        return Err(EngineError::invalid_argument(format!(
            "Invalid payout amount: {}",
            draft.amount_display
        )));
    }
    Ok(PayoutInstruction {
        recipient_address: draft.recipient_address.clone(),
        amount: display_to_minor(draft.amount_display),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fake_unit, FakeLedger};
    use bitcoin::Network;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    struct Harness {
        ledger: Arc<FakeLedger>,
        keys: Arc<KeyService>,
        orchestrator: SettlementOrchestrator,
    }

    fn harness() -> Harness {
        harness_with_treasury(None)
    }

    fn harness_with_treasury(treasury_address: Option<String>) -> Harness {
        let ledger = Arc::new(FakeLedger::new());
        let keys = Arc::new(KeyService::with_mnemonic(Network::Regtest, TEST_MNEMONIC).unwrap());
        let mut config = EngineConfig::default();
        config.treasury_address = treasury_address;
        let orchestrator = SettlementOrchestrator::new(
            config,
            ledger.clone() as Arc<dyn LedgerQuery>,
            keys.clone(),
            None,
        )
        .unwrap();
        Harness {
            ledger,
            keys,
            orchestrator,
        }
    }

    fn fund_seat(h: &Harness, room: &str, seat: u32, tag: u8, sats: u64) {
        let derived = h.keys.derive_for_seat(room, seat).unwrap();
        ledger_fund(h, &derived.address, tag, sats);
    }

    fn ledger_fund(h: &Harness, address: &bitcoin::Address, tag: u8, sats: u64) {
        h.ledger.fund(address, vec![fake_unit(address, tag, sats)]);
    }

    #[test]
    fn test_display_to_minor_floors() {
        assert_eq!(display_to_minor(1.5), Amount::from_sat(150_000_000));
        assert_eq!(display_to_minor(0.123456789), Amount::from_sat(12_345_678));
        assert_eq!(display_to_minor(0.00000001), Amount::from_sat(1));
    }

    #[tokio::test]
    async fn test_payout_no_funds() {
        let h = harness();
        let winner = h.keys.derive_for_room("winner").unwrap();

        let result = h
            .orchestrator
            .payout(
                "room-1",
                2,
                &[PayoutDraft {
                    recipient_address: winner.address.to_string(),
                    amount_display: 1.0,
                }],
            )
            .await;
        assert!(matches!(result, Err(EngineError::NoFunds)));
        assert!(h.ledger.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_payout_submits_one_transaction() {
        let h = harness();
        fund_seat(&h, "room-1", 0, 1, 150_000_000);
        fund_seat(&h, "room-1", 1, 2, 150_000_000);

        let winner = h.keys.derive_for_room("winner").unwrap();
        let txid = h
            .orchestrator
            .payout(
                "room-1",
                2,
                &[PayoutDraft {
                    recipient_address: winner.address.to_string(),
                    amount_display: 2.5,
                }],
            )
            .await
            .unwrap();

        let submitted = h.ledger.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].compute_txid(), txid);
        assert_eq!(submitted[0].input.len(), 2);

        // 250_000_000 to the winner, change back to a seat address
        let winner_script = winner.address.script_pubkey();
        let paid: u64 = submitted[0]
            .output
            .iter()
            .filter(|o| o.script_pubkey == winner_script)
            .map(|o| o.value.to_sat())
            .sum();
        assert_eq!(paid, 250_000_000);
        assert_eq!(submitted[0].output.len(), 2);
    }

    #[tokio::test]
    async fn test_payout_change_goes_to_treasury() {
        let keys = KeyService::with_mnemonic(Network::Regtest, TEST_MNEMONIC).unwrap();
        let treasury = keys.derive_for_room("treasury").unwrap();
        let h = harness_with_treasury(Some(treasury.address.to_string()));
        fund_seat(&h, "room-1", 0, 1, 300_000_000);

        let winner = h.keys.derive_for_room("winner").unwrap();
        h.orchestrator
            .payout(
                "room-1",
                1,
                &[PayoutDraft {
                    recipient_address: winner.address.to_string(),
                    amount_display: 2.0,
                }],
            )
            .await
            .unwrap();

        let submitted = h.ledger.submitted.lock();
        let treasury_script = treasury.address.script_pubkey();
        assert!(submitted[0]
            .output
            .iter()
            .any(|o| o.script_pubkey == treasury_script));
    }

    #[tokio::test]
    async fn test_payout_falls_back_when_treasury_invalid() {
        // mainnet treasury address is invalid on regtest
        let h = harness_with_treasury(Some(
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string(),
        ));
        fund_seat(&h, "room-1", 0, 1, 300_000_000);

        let winner = h.keys.derive_for_room("winner").unwrap();
        let seat = h.keys.derive_for_seat("room-1", 0).unwrap();
        h.orchestrator
            .payout(
                "room-1",
                1,
                &[PayoutDraft {
                    recipient_address: winner.address.to_string(),
                    amount_display: 2.0,
                }],
            )
            .await
            .unwrap();

        // build did not fail; change went to the contributing seat address
        let submitted = h.ledger.submitted.lock();
        let seat_script = seat.address.script_pubkey();
        assert!(submitted[0]
            .output
            .iter()
            .any(|o| o.script_pubkey == seat_script));
    }

    #[tokio::test]
    async fn test_payout_failure_is_surfaced_not_retried() {
        let h = harness();
        fund_seat(&h, "room-1", 0, 1, 300_000_000);
        h.ledger.fail_submissions();

        let winner = h.keys.derive_for_room("winner").unwrap();
        let result = h
            .orchestrator
            .payout(
                "room-1",
                1,
                &[PayoutDraft {
                    recipient_address: winner.address.to_string(),
                    amount_display: 1.0,
                }],
            )
            .await;

        assert!(matches!(result, Err(EngineError::Transport(_))));
        assert!(h.ledger.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_refund_no_eligible_depositors() {
        let h = harness();
        fund_seat(&h, "room-1", 0, 1, 200_000_000);

        let depositors = vec![
            Depositor {
                seat_index: 0,
                withdrawal_address: None,
                deposit_confirmed: true,
            },
            Depositor {
                seat_index: 1,
                withdrawal_address: Some("addr".to_string()),
                deposit_confirmed: false,
            },
        ];

        let txids = h.orchestrator.refund("room-1", 2, &depositors).await.unwrap();
        assert!(txids.is_empty());
        assert!(h.ledger.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_refund_abandoned_below_fee_buffer() {
        let h = harness();
        // 50_000 aggregated, 100_000 buffer: abandoned
        fund_seat(&h, "room-1", 0, 1, 50_000);

        let payee = h.keys.derive_for_room("payee").unwrap();
        let depositors = vec![Depositor {
            seat_index: 0,
            withdrawal_address: Some(payee.address.to_string()),
            deposit_confirmed: true,
        }];

        let txids = h.orchestrator.refund("room-1", 1, &depositors).await.unwrap();
        assert!(txids.is_empty());
        assert!(h.ledger.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_refund_splits_evenly_after_buffer() {
        let h = harness();
        fund_seat(&h, "room-1", 0, 1, 100_000_000);
        fund_seat(&h, "room-1", 1, 2, 100_000_000);

        let payee_a = h.keys.derive_for_room("payee-a").unwrap();
        let payee_b = h.keys.derive_for_room("payee-b").unwrap();
        let depositors = vec![
            Depositor {
                seat_index: 0,
                withdrawal_address: Some(payee_a.address.to_string()),
                deposit_confirmed: true,
            },
            Depositor {
                seat_index: 1,
                withdrawal_address: Some(payee_b.address.to_string()),
                deposit_confirmed: true,
            },
        ];

        let txids = h.orchestrator.refund("room-1", 2, &depositors).await.unwrap();
        assert_eq!(txids.len(), 1);

        // (200_000_000 - 100_000) / 2 = 99_950_000 each
        let submitted = h.ledger.submitted.lock();
        for payee in [&payee_a, &payee_b] {
            let script = payee.address.script_pubkey();
            let refunded: u64 = submitted[0]
                .output
                .iter()
                .filter(|o| o.script_pubkey == script)
                .map(|o| o.value.to_sat())
                .sum();
            assert_eq!(refunded, 99_950_000);
        }

        // refund invariant: refund outputs + fee buffer never exceed the input total
        let refund_outputs = 2 * 99_950_000u64;
        assert!(refund_outputs + 100_000 <= 200_000_000);
    }

    #[tokio::test]
    async fn test_refund_records_audit_trail() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            Storage::new(&dir.path().join("potline.db")).await.unwrap(),
        );

        let ledger = Arc::new(FakeLedger::new());
        let keys = Arc::new(KeyService::with_mnemonic(Network::Regtest, TEST_MNEMONIC).unwrap());
        let orchestrator = SettlementOrchestrator::new(
            EngineConfig::default(),
            ledger.clone() as Arc<dyn LedgerQuery>,
            keys.clone(),
            Some(storage),
        )
        .unwrap();

        let seat = keys.derive_for_seat("room-7", 0).unwrap();
        ledger.fund(&seat.address, vec![fake_unit(&seat.address, 1, 200_000_000)]);

        let payee = keys.derive_for_room("payee").unwrap();
        let depositors = vec![Depositor {
            seat_index: 0,
            withdrawal_address: Some(payee.address.to_string()),
            deposit_confirmed: true,
        }];

        let txids = orchestrator.refund("room-7", 1, &depositors).await.unwrap();
        assert_eq!(txids.len(), 1);

        let events = orchestrator.events_for_room("room-7").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, SettlementState::Submitted);
        assert_eq!(events[0].txid.as_deref(), Some(txids[0].to_string().as_str()));

        orchestrator.mark_confirmed(events[0].id).await.unwrap();
        let events = orchestrator.events_for_room("room-7").await.unwrap();
        assert_eq!(events[0].state, SettlementState::Confirmed);
    }
}
