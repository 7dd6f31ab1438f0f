use super::CliContext;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use potline_core::{
    Depositor, EngineError, PayoutDraft, Result, SettlementOrchestrator,
};

#[derive(Subcommand)]
pub enum SettleCommands {
    /// Pay winners out of a room's seat deposits
    Payout {
        /// Room id
        room_id: String,
        /// Number of seats to aggregate
        #[arg(long)]
        seats: u32,
        /// Payout as address=amount (display units), repeatable
        #[arg(long = "pay", required = true)]
        pays: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Refund a room's deposits to their depositors
    Refund {
        /// Room id
        room_id: String,
        /// Number of seats to aggregate
        #[arg(long)]
        seats: u32,
        /// Depositor as seat_index=withdrawal_address, repeatable
        #[arg(long = "depositor", required = true)]
        depositors: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show the settlement audit trail for a room
    History {
        /// Room id
        room_id: String,
    },
}

pub async fn handle_settle_command(cmd: SettleCommands, ctx: &CliContext) -> Result<()> {
    match cmd {
        SettleCommands::Payout {
            room_id,
            seats,
            pays,
            yes,
        } => {
            let drafts = pays
                .iter()
                .map(|raw| parse_payout(raw))
                .collect::<Result<Vec<_>>>()?;

            let total: f64 = drafts.iter().map(|d| d.amount_display).sum();
            if !yes && !confirm(&format!(
                "Submit payout of {} display units from room '{}'?",
                total, room_id
            ))? {
                println!("Aborted");
                return Ok(());
            }

            let orchestrator = build_orchestrator(ctx).await?;
            let txid = orchestrator.payout(&room_id, seats, &drafts).await?;
            tracing::info!("Payout for room {} submitted as {}", room_id, txid);
            println!("Payout submitted: {}", txid);
        }

        SettleCommands::Refund {
            room_id,
            seats,
            depositors,
            yes,
        } => {
            let depositors = depositors
                .iter()
                .map(|raw| parse_depositor(raw))
                .collect::<Result<Vec<_>>>()?;

            if !yes && !confirm(&format!(
                "Submit refund to {} depositors of room '{}'?",
                depositors.len(),
                room_id
            ))? {
                println!("Aborted");
                return Ok(());
            }

            let orchestrator = build_orchestrator(ctx).await?;
            let txids = orchestrator.refund(&room_id, seats, &depositors).await?;

            if txids.is_empty() {
                println!("Refund abandoned: nothing to distribute");
            } else {
                for txid in txids {
                    println!("Refund submitted: {}", txid);
                }
            }
        }

        SettleCommands::History { room_id } => {
            let storage = ctx.storage().await?;
            let store = potline_core::SettlementStore::new(&storage);
            let events = store.events_for_room(&room_id).await?;

            if events.is_empty() {
                println!("No settlement events for room '{}'", room_id);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Event", "Kind", "State", "Txid", "Failure", "Updated"]);

            for event in events {
                table.add_row(vec![
                    event.id.to_string(),
                    format!("{:?}", event.kind),
                    format!("{:?}", event.state),
                    event.txid.unwrap_or_default(),
                    event.failure.unwrap_or_default(),
                    event.updated_at.to_rfc3339(),
                ]);
            }

            println!("{table}");
        }
    }

    Ok(())
}

async fn build_orchestrator(ctx: &CliContext) -> Result<SettlementOrchestrator> {
    let config = ctx.engine_config()?;
    let keys = ctx.key_service().await?;
    let ledger = ctx.ledger(&config)?;
    let storage = ctx.storage().await?;

    SettlementOrchestrator::new(config, ledger, keys, Some(storage))
}

fn parse_payout(raw: &str) -> Result<PayoutDraft> {
    let (address, amount) = raw.split_once('=').ok_or_else(|| {
        EngineError::invalid_argument(format!("Expected address=amount, got '{}'", raw))
    })?;

    let amount_display: f64 = amount.parse().map_err(|_| {
        EngineError::invalid_argument(format!("Invalid payout amount '{}'", amount))
    })?;

    Ok(PayoutDraft {
        recipient_address: address.to_string(),
        amount_display,
    })
}

fn parse_depositor(raw: &str) -> Result<Depositor> {
    let (seat, address) = raw.split_once('=').ok_or_else(|| {
        EngineError::invalid_argument(format!(
            "Expected seat_index=withdrawal_address, got '{}'",
            raw
        ))
    })?;

    let seat_index: u32 = seat
        .parse()
        .map_err(|_| EngineError::invalid_argument(format!("Invalid seat index '{}'", seat)))?;

    // operator-supplied depositors are confirmed by definition; the room
    // layer passes its own eligibility flags when calling the engine directly
    Ok(Depositor {
        seat_index,
        withdrawal_address: Some(address.to_string()),
        deposit_confirmed: true,
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| EngineError::internal(format!("Confirmation prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payout() {
        let draft = parse_payout("bcrt1qaddress=1.5").unwrap();
        assert_eq!(draft.recipient_address, "bcrt1qaddress");
        assert_eq!(draft.amount_display, 1.5);

        assert!(parse_payout("no-separator").is_err());
        assert!(parse_payout("addr=not-a-number").is_err());
    }

    #[test]
    fn test_parse_depositor() {
        let depositor = parse_depositor("3=bcrt1qaddress").unwrap();
        assert_eq!(depositor.seat_index, 3);
        assert_eq!(depositor.withdrawal_address.as_deref(), Some("bcrt1qaddress"));
        assert!(depositor.deposit_confirmed);

        assert!(parse_depositor("x=addr").is_err());
    }
}
