use super::{prompt_password, CliContext};
use clap::Subcommand;
use potline_core::keys::generate_mnemonic;
use potline_core::secret::{seal_master, write_sealed};
use potline_core::{EngineError, Result};

#[derive(Subcommand)]
pub enum SecretCommands {
    /// Seal a master mnemonic to disk under an operator password
    Init {
        /// Generate a fresh mnemonic instead of entering one
        #[arg(long)]
        generate: bool,
    },

    /// Show the fingerprint of the sealed master secret
    Show,
}

pub async fn handle_secret_command(cmd: SecretCommands, ctx: &CliContext) -> Result<()> {
    match cmd {
        SecretCommands::Init { generate } => {
            let path = ctx.seal_path();
            if path.exists() {
                return Err(EngineError::config(format!(
                    "A sealed master secret already exists at {}",
                    path.display()
                )));
            }

            let mnemonic = if generate {
                let mnemonic = generate_mnemonic()?;
                println!("Generated master mnemonic (write this down, it is shown once):");
                println!();
                println!("  {}", mnemonic);
                println!();
                mnemonic
            } else {
                dialoguer::Input::new()
                    .with_prompt("Master mnemonic")
                    .interact_text()
                    .map_err(|e| EngineError::secret(format!("Mnemonic prompt failed: {}", e)))?
            };

            let password = prompt_password("Sealing password")?;
            let confirmed = prompt_password("Confirm sealing password")?;
            if password != confirmed {
                return Err(EngineError::secret("Passwords do not match"));
            }

            let sealed = seal_master(&mnemonic, &password)?;
            write_sealed(&path, &sealed).await?;
            println!("Sealed master secret written to {}", path.display());
        }

        SecretCommands::Show => {
            let keys = ctx.key_service().await?;
            println!("Network:     {:?}", keys.network());
            println!("Fingerprint: {}", keys.master_fingerprint()?);
        }
    }

    Ok(())
}
