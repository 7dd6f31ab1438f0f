use crate::error::{EngineError, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub network: Network,
    pub esplora_url: String,
    /// House-cut / change destination. May be unset or invalid for the
    /// active network; the builder then falls back to a seat address.
    pub treasury_address: Option<String>,
    pub fee_policy: FeePolicy,
}

/// Flat per-transaction fees. The target chain's fee model is low and
/// near-flat, so fees are policy constants rather than computed from byte
/// size; callers wanting size-scaled fees supply their own policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeePolicy {
    pub base_fee_sats: u64,
    pub priority_surcharge_sats: u64,
    /// Reserved off the top of an aggregated refund before the even split.
    pub refund_fee_buffer_sats: u64,
    /// Change below this is absorbed into the fee instead of creating an
    /// unspendable-in-practice output.
    pub dust_limit_sats: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            base_fee_sats: 10_000,
            priority_surcharge_sats: 10_000,
            refund_fee_buffer_sats: 100_000,
            dust_limit_sats: 546,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            esplora_url: "http://localhost:3000".to_string(),
            treasury_address: None,
            fee_policy: FeePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(network: Network) -> Self {
        let mut config = Self::default();
        config.network = network;

        match network {
            Network::Signet => {
                config.esplora_url = "https://mempool.space/signet/api".to_string();
            }
            Network::Testnet => {
                config.esplora_url = "https://mempool.space/testnet/api".to_string();
            }
            Network::Regtest => {
                // keep defaults for regtest
            }
            _ => {
                config.esplora_url = "https://mempool.space/api".to_string();
            }
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.esplora_url.is_empty() {
            return Err(EngineError::config("Esplora URL cannot be empty"));
        }

        if self.fee_policy.base_fee_sats == 0 {
            return Err(EngineError::config("Base fee must be greater than 0"));
        }

        if self.fee_policy.refund_fee_buffer_sats < self.fee_policy.base_fee_sats {
            return Err(EngineError::config(
                "Refund fee buffer must cover at least the base fee",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_base_fee_rejected() {
        let mut config = EngineConfig::default();
        config.fee_policy.base_fee_sats = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_below_base_fee_rejected() {
        let mut config = EngineConfig::default();
        config.fee_policy.refund_fee_buffer_sats = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_network_presets() {
        let config = EngineConfig::new(Network::Signet);
        assert!(config.esplora_url.contains("signet"));
        assert!(config.validate().is_ok());
    }
}
