use clap::Subcommand;
use potline_core::{EngineError, Result};
use potline_fairness::{
    commit, compute_outcome_digest, derive_client_seed, pick_among_alive, verify_commitment,
    Commitment, RoundRandomnessInput, ServerSeed,
};

#[derive(Subcommand)]
pub enum FairnessCommands {
    /// Generate a fresh server seed and print its commitment
    Generate,

    /// Print the commitment for a server seed
    Commit {
        /// Server seed (hex)
        seed: String,
    },

    /// Check a revealed server seed against a published commitment
    VerifyCommitment {
        /// Revealed server seed (hex)
        seed: String,
        /// Published commitment (hex)
        commitment: String,
    },

    /// Derive a client seed from raw client-supplied material
    ClientSeed {
        /// Raw material (signed message, address, ...)
        material: String,
    },

    /// Re-derive a round's outcome digest and compare it to the claimed one
    VerifyOutcome {
        /// Revealed server seed (hex)
        #[arg(long)]
        seed: String,
        /// Round context id (room id)
        #[arg(long)]
        context: String,
        /// Round index
        #[arg(long)]
        round_index: u64,
        /// Block hash mixed into the round
        #[arg(long)]
        block_hash: String,
        /// Claimed outcome digest (hex)
        #[arg(long)]
        digest: String,
        /// Client seeds, one flag per participant (order does not matter)
        #[arg(long = "client-seed")]
        client_seeds: Vec<String>,
    },

    /// Select a winner index from a digest and the list of live seats
    Pick {
        /// Outcome digest (hex)
        #[arg(long)]
        digest: String,
        /// Live seat indices, comma separated
        #[arg(long, value_delimiter = ',')]
        alive: Vec<u32>,
    },
}

pub fn handle_fairness_command(cmd: FairnessCommands) -> Result<()> {
    match cmd {
        FairnessCommands::Generate => {
            let seed = ServerSeed::generate();
            let commitment = commit(&seed);
            println!("Server seed: {}", seed.to_hex());
            println!("Commitment:  {}", commitment.to_hex());
            println!();
            println!("Publish the commitment before play; keep the seed secret until settlement.");
        }

        FairnessCommands::Commit { seed } => {
            let seed = parse_seed(&seed)?;
            println!("{}", commit(&seed).to_hex());
        }

        FairnessCommands::VerifyCommitment { seed, commitment } => {
            let seed = parse_seed(&seed)?;
            let commitment = Commitment::from_hex(&commitment)
                .map_err(|e| EngineError::invalid_argument(e.to_string()))?;

            if verify_commitment(&seed, &commitment) {
                println!("VALID: revealed seed matches the commitment");
            } else {
                println!("INVALID: revealed seed does NOT match the commitment");
            }
        }

        FairnessCommands::ClientSeed { material } => {
            println!("{}", derive_client_seed(&material));
        }

        FairnessCommands::VerifyOutcome {
            seed,
            context,
            round_index,
            block_hash,
            digest,
            client_seeds,
        } => {
            let input = RoundRandomnessInput {
                server_seed: parse_seed(&seed)?,
                client_seeds,
                round_context_id: context,
                round_index,
                block_hash,
            };
            let claimed = parse_digest(&digest)?;

            let derived = compute_outcome_digest(&input);
            if derived == claimed {
                println!("VALID: outcome digest re-derives from the round inputs");
            } else {
                println!("INVALID: outcome digest does not match");
                println!("Expected: {}", hex::encode(derived));
                println!("Claimed:  {}", hex::encode(claimed));
            }
        }

        FairnessCommands::Pick { digest, alive } => {
            let digest = parse_digest(&digest)?;
            let picked = pick_among_alive(&digest, &alive)
                .map_err(|e| EngineError::invalid_argument(e.to_string()))?;
            println!("Selected seat index: {}", picked);
        }
    }

    Ok(())
}

fn parse_seed(hex_seed: &str) -> Result<ServerSeed> {
    ServerSeed::from_hex(hex_seed).map_err(|e| EngineError::invalid_argument(e.to_string()))
}

fn parse_digest(hex_digest: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(hex_digest)
        .map_err(|e| EngineError::invalid_argument(format!("Invalid digest hex: {}", e)))?;
    raw.try_into()
        .map_err(|_| EngineError::invalid_argument("Digest must be 32 bytes"))
}
