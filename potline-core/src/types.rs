use bitcoin::{Amount, OutPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discrete spendable output custodied at one of our deposit addresses.
///
/// Created when a deposit transaction confirms; consumed exactly once when
/// included as an input of a settlement transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundUnit {
    pub outpoint: OutPoint,
    pub owner_address: String,
    pub amount: Amount,
    pub is_coinbase: bool,
    pub block_height: u64,
}

/// Spendable units at a single address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpendableSet {
    pub units: Vec<FundUnit>,
    pub total: Amount,
}

impl SpendableSet {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// One output of a settlement transaction, in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub recipient_address: String,
    pub amount: Amount,
}

/// A payout as handed over by the round-resolution layer, in display units.
/// Converted to minor units (floor) by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutDraft {
    pub recipient_address: String,
    pub amount_display: f64,
}

/// A seat's depositor as the room layer knows it, used to decide refund
/// eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depositor {
    pub seat_index: u32,
    pub withdrawal_address: Option<String>,
    pub deposit_confirmed: bool,
}

impl Depositor {
    /// Eligible for a refund: supplied a withdrawal address and actually
    /// funded the seat. A joined-but-unpaid participant gets nothing.
    pub fn is_refundable(&self) -> bool {
        self.withdrawal_address.is_some() && self.deposit_confirmed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementKind {
    Payout,
    Refund,
}

/// Settlement event lifecycle. Failure at any step is terminal; the caller
/// decides whether to start a fresh event with re-aggregated funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementState {
    Collecting,
    Built,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

/// Audit record of one settlement event, reported to the settlement store
/// on every state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub room_id: String,
    pub kind: SettlementKind,
    pub state: SettlementState,
    pub txid: Option<String>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn new(room_id: &str, kind: SettlementKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            kind,
            state: SettlementState::Collecting,
            txid: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }
}
