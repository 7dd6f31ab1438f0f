//! Provably fair randomness engine for round outcomes.
//!
//! Commit-reveal scheme: the server commits to a secret seed before play,
//! clients contribute their own seeds, and the outcome digest binds both
//! sides plus a future block hash. Everything here is a pure function so
//! settled rounds can be publicly re-verified after the seed is revealed.

pub mod commitment;
pub mod error;
pub mod outcome;

pub use commitment::{commit, derive_client_seed, verify_commitment, Commitment, ServerSeed};
pub use error::{FairnessError, Result};
pub use outcome::{
    audit_round, compute_outcome_digest, digest_to_index, pick_among_alive, verify_outcome,
    OutcomeDigest, RoundRandomnessInput,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_reveal_flow() {
        let seed = ServerSeed::generate();
        let commitment = commit(&seed);

        // publish commitment, play the round, then reveal
        let input = RoundRandomnessInput {
            server_seed: seed.clone(),
            client_seeds: vec![derive_client_seed("player-1"), derive_client_seed("player-2")],
            round_context_id: "room-1".to_string(),
            round_index: 0,
            block_hash: "deadbeef".to_string(),
        };
        let digest = compute_outcome_digest(&input);

        assert!(verify_commitment(&seed, &commitment));
        assert!(verify_outcome(&input, &digest));
    }
}
