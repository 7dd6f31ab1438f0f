use potline_core::keys::generate_mnemonic;
use potline_core::secret::{seal_master, unseal_master};
use potline_core::{EngineConfig, KeyService, Network};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Generate a master secret for the engine
    let mnemonic = generate_mnemonic()?;
    println!("Master mnemonic: {}", mnemonic);

    let keys = KeyService::with_mnemonic(Network::Regtest, &mnemonic)?;
    println!("Master fingerprint: {}", keys.master_fingerprint()?);

    // Deterministic deposit addresses for a room and its seats
    let room = keys.derive_for_room("demo-room")?;
    println!("\nRoom pot address: {}", room.address);

    for seat in 0..4u32 {
        let derived = keys.derive_for_seat("demo-room", seat)?;
        println!("Seat {} address:   {}", seat, derived.address);
    }

    // The same master + identifier always re-derives the same address
    let again = keys.derive_for_seat("demo-room", 0)?;
    let first = keys.derive_for_seat("demo-room", 0)?;
    assert_eq!(first.address, again.address);

    // Seal the mnemonic for storage at rest
    let sealed = seal_master(&mnemonic, "example-password")?;
    let recovered = unseal_master(&sealed, "example-password")?;
    assert_eq!(recovered, mnemonic);
    println!("\nSealed and recovered the master secret");

    // Engine configuration with defaults for the active network
    let config = EngineConfig::new(Network::Regtest);
    config.validate()?;
    println!(
        "Engine config: esplora {}, base fee {} sats",
        config.esplora_url, config.fee_policy.base_fee_sats
    );

    println!("\nExample completed successfully!");

    Ok(())
}
