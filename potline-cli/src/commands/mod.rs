pub mod address;
pub mod fairness;
pub mod funds;
pub mod secret;
pub mod settle;

pub use address::{handle_address_command, AddressCommands};
pub use fairness::{handle_fairness_command, FairnessCommands};
pub use funds::{handle_funds_command, FundsCommands};
pub use secret::{handle_secret_command, SecretCommands};
pub use settle::{handle_settle_command, SettleCommands};

use potline_core::secret::{read_sealed, unseal_master};
use potline_core::{
    EngineConfig, EngineError, EsploraLedger, KeyService, LedgerQuery, Network, Result, Storage,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared context assembled from the global CLI arguments.
pub struct CliContext {
    pub data_dir: PathBuf,
    network_name: String,
    esplora_url: Option<String>,
    treasury: Option<String>,
}

impl CliContext {
    pub fn new(
        data_dir: PathBuf,
        network_name: &str,
        esplora_url: Option<String>,
        treasury: Option<String>,
    ) -> Self {
        Self {
            data_dir,
            network_name: network_name.to_string(),
            esplora_url,
            treasury,
        }
    }

    pub fn network(&self) -> Result<Network> {
        match self.network_name.as_str() {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(EngineError::config(format!("Unknown network: {}", other))),
        }
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::new(self.network()?);
        if let Some(url) = &self.esplora_url {
            config.esplora_url = url.clone();
        }
        config.treasury_address = self.treasury.clone();
        config.validate()?;
        Ok(config)
    }

    pub fn ledger(&self, config: &EngineConfig) -> Result<Arc<dyn LedgerQuery>> {
        Ok(Arc::new(EsploraLedger::new(&config.esplora_url)?) as Arc<dyn LedgerQuery>)
    }

    pub fn seal_path(&self) -> PathBuf {
        self.data_dir.join("master.seal")
    }

    /// Unseal the master mnemonic and load it into a key service. Prompts
    /// for the operator password.
    pub async fn key_service(&self) -> Result<Arc<KeyService>> {
        let path = self.seal_path();
        if !path.exists() {
            return Err(EngineError::Uninitialized);
        }

        let sealed = read_sealed(&path).await?;
        let password = prompt_password("Master secret password")?;
        let mnemonic = unseal_master(&sealed, &password)?;

        Ok(Arc::new(KeyService::with_mnemonic(
            self.network()?,
            &mnemonic,
        )?))
    }

    pub async fn storage(&self) -> Result<Arc<Storage>> {
        let db_path = self.data_dir.join("potline.db");
        Ok(Arc::new(Storage::new(&db_path).await?))
    }
}

pub(crate) fn prompt_password(prompt: &str) -> Result<String> {
    dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| EngineError::secret(format!("Password prompt failed: {}", e)))
}
