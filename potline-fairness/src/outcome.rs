use crate::{Commitment, FairnessError, Result, ServerSeed};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Delimiter between the concatenated digest inputs. Client seeds are hex
/// and context ids are uuids, so '|' cannot occur inside a component.
const DIGEST_DELIMITER: &str = "|";

pub type OutcomeDigest = [u8; 32];

/// Everything a round outcome is derived from.
///
/// The digest is a pure function of this tuple and is independent of the
/// order of `client_seeds`: a colluding participant must not be able to bias
/// the result by choosing submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRandomnessInput {
    pub server_seed: ServerSeed,
    pub client_seeds: Vec<String>,
    pub round_context_id: String,
    pub round_index: u64,
    pub block_hash: String,
}

/// Keyed outcome digest for one round.
///
/// Sorts client seeds lexicographically, joins them with the round context
/// id, round index and block hash, then computes HMAC-SHA256 keyed by the
/// server seed. The server commits to its seed before any client seed is
/// known, and the block hash is unknown at commit time, so neither party
/// alone can predict or steer the result.
pub fn compute_outcome_digest(input: &RoundRandomnessInput) -> OutcomeDigest {
    let mut sorted = input.client_seeds.clone();
    sorted.sort();

    let mut parts = sorted;
    parts.push(input.round_context_id.clone());
    parts.push(input.round_index.to_string());
    parts.push(input.block_hash.clone());
    let message = parts.join(DIGEST_DELIMITER);

    let mut mac = HmacSha256::new_from_slice(input.server_seed.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().into()
}

/// First 8 digest bytes as a big-endian integer, reduced mod `modulus`.
pub fn digest_to_index(digest: &OutcomeDigest, modulus: u64) -> Result<u64> {
    if modulus == 0 {
        return Err(FairnessError::invalid_argument("Modulus must be non-zero"));
    }
    let head: [u8; 8] = digest[..8].try_into().expect("slice is 8 bytes");
    Ok(u64::from_be_bytes(head) % modulus)
}

/// Selects one member of `alive` by the digest. `alive` is the ordered list
/// of still-live seat indices; callers must never invoke this with zero live
/// participants.
pub fn pick_among_alive(digest: &OutcomeDigest, alive: &[u32]) -> Result<u32> {
    if alive.is_empty() {
        return Err(FairnessError::EmptyAliveSet);
    }
    let idx = digest_to_index(digest, alive.len() as u64)?;
    Ok(alive[idx as usize])
}

/// Post-hoc audit: re-derive the digest and compare.
pub fn verify_outcome(input: &RoundRandomnessInput, claimed: &OutcomeDigest) -> bool {
    compute_outcome_digest(input) == *claimed
}

/// Full audit of a settled game: the revealed seed must match the published
/// commitment and the claimed digest must re-derive from the inputs.
pub fn audit_round(
    commitment: &Commitment,
    input: &RoundRandomnessInput,
    claimed: &OutcomeDigest,
) -> bool {
    crate::verify_commitment(&input.server_seed, commitment) && verify_outcome(input, claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(client_seeds: Vec<&str>) -> RoundRandomnessInput {
        RoundRandomnessInput {
            server_seed: ServerSeed::from_bytes([7u8; 32]),
            client_seeds: client_seeds.into_iter().map(String::from).collect(),
            round_context_id: "room-42".to_string(),
            round_index: 3,
            block_hash: "00000000000000000001b2c3".to_string(),
        }
    }

    #[test]
    fn test_digest_is_order_independent() {
        let a = compute_outcome_digest(&sample_input(vec!["b", "a"]));
        let b = compute_outcome_digest(&sample_input(vec!["a", "b"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_changes_with_round_index() {
        let mut input = sample_input(vec!["a", "b"]);
        let first = compute_outcome_digest(&input);
        input.round_index = 4;
        assert_ne!(first, compute_outcome_digest(&input));
    }

    #[test]
    fn test_digest_changes_with_server_seed() {
        let mut input = sample_input(vec!["a"]);
        let first = compute_outcome_digest(&input);
        input.server_seed = ServerSeed::from_bytes([8u8; 32]);
        assert_ne!(first, compute_outcome_digest(&input));
    }

    #[test]
    fn test_index_in_range() {
        let digest = compute_outcome_digest(&sample_input(vec!["a"]));
        for modulus in [1u64, 2, 7, 100] {
            let idx = digest_to_index(&digest, modulus).unwrap();
            assert!(idx < modulus);
        }
    }

    #[test]
    fn test_zero_modulus_rejected() {
        let digest = [0u8; 32];
        assert!(matches!(
            digest_to_index(&digest, 0),
            Err(FairnessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pick_returns_member() {
        let alive = vec![2u32, 5, 9, 11];
        for seeds in [vec!["a"], vec!["b"], vec!["c", "d"]] {
            let digest = compute_outcome_digest(&sample_input(seeds));
            let picked = pick_among_alive(&digest, &alive).unwrap();
            assert!(alive.contains(&picked));
        }
    }

    #[test]
    fn test_pick_empty_alive_set_rejected() {
        let digest = [1u8; 32];
        assert_eq!(
            pick_among_alive(&digest, &[]),
            Err(FairnessError::EmptyAliveSet)
        );
    }

    #[test]
    fn test_verify_outcome_detects_tamper() {
        let input = sample_input(vec!["a", "b"]);
        let mut digest = compute_outcome_digest(&input);
        assert!(verify_outcome(&input, &digest));

        digest[0] ^= 0xff;
        assert!(!verify_outcome(&input, &digest));
    }

    #[test]
    fn test_audit_round() {
        let input = sample_input(vec!["a"]);
        let commitment = crate::commit(&input.server_seed);
        let digest = compute_outcome_digest(&input);

        assert!(audit_round(&commitment, &input, &digest));

        let wrong_commitment = Commitment::of(b"something else");
        assert!(!audit_round(&wrong_commitment, &input, &digest));
    }
}
