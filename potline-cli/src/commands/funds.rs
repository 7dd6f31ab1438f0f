use super::CliContext;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use potline_core::{Result, UtxoAggregator};

#[derive(Subcommand)]
pub enum FundsCommands {
    /// Show spendable deposits across a room's seat addresses
    Show {
        /// Room id
        room_id: String,
        /// Number of seats to scan
        #[arg(long, default_value_t = 8)]
        seats: u32,
    },
}

pub async fn handle_funds_command(cmd: FundsCommands, ctx: &CliContext) -> Result<()> {
    match cmd {
        FundsCommands::Show { room_id, seats } => {
            let config = ctx.engine_config()?;
            let keys = ctx.key_service().await?;
            let ledger = ctx.ledger(&config)?;

            let aggregator = UtxoAggregator::new(ledger, keys);
            let aggregate = aggregator.aggregate_for_seats(&room_id, seats).await?;

            if aggregate.is_empty() {
                println!("No spendable funds for room '{}'", room_id);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Outpoint", "Address", "Amount (sats)", "Height"]);

            for unit in &aggregate.units {
                table.add_row(vec![
                    unit.outpoint.to_string(),
                    unit.owner_address.clone(),
                    unit.amount.to_sat().to_string(),
                    unit.block_height.to_string(),
                ]);
            }

            println!("{table}");
            println!(
                "Total: {} sats ({:.8} BTC) across {} addresses",
                aggregate.total.to_sat(),
                aggregate.total.to_btc(),
                aggregate.keys_by_address.len()
            );
        }
    }

    Ok(())
}
