use super::CliContext;
use clap::Subcommand;
use potline_core::keys::{room_identifier, seat_identifier, KeyService};
use potline_core::Result;

#[derive(Subcommand)]
pub enum AddressCommands {
    /// Deposit address for a room pot
    Room {
        /// Room id
        room_id: String,
    },

    /// Deposit address for one seat of a room
    Seat {
        /// Room id
        room_id: String,
        /// Seat index
        seat_index: u32,
    },
}

pub async fn handle_address_command(cmd: AddressCommands, ctx: &CliContext) -> Result<()> {
    let keys = ctx.key_service().await?;

    match cmd {
        AddressCommands::Room { room_id } => {
            let derived = keys.derive_for_room(&room_id)?;
            let identifier = room_identifier(&room_id);
            println!("Room:       {}", room_id);
            println!("Identifier: {}", identifier);
            println!("Index:      {}", KeyService::index_for_identifier(&identifier));
            println!("Address:    {}", derived.address);
        }

        AddressCommands::Seat {
            room_id,
            seat_index,
        } => {
            let derived = keys.derive_for_seat(&room_id, seat_index)?;
            let identifier = seat_identifier(&room_id, seat_index);
            println!("Seat:       {} of room {}", seat_index, room_id);
            println!("Identifier: {}", identifier);
            println!("Index:      {}", KeyService::index_for_identifier(&identifier));
            println!("Address:    {}", derived.address);
        }
    }

    Ok(())
}
