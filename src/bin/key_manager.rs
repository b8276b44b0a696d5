//! Key Management CLI Tool
//!
//! Creates and inspects the secp256k1 key the audit service signs entries with.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use bridge_audit::audit::Secp256k1Signer;

#[derive(Parser)]
#[command(name = "key-manager")]
#[command(about = "Bridge audit signing key management tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new signing key
    Generate {
        /// File to write the hex secret key to
        #[arg(short, long)]
        out: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Print the public key for a key file
    PublicKey {
        /// Hex secret key file
        #[arg(short, long)]
        key: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { out, force } => {
            if out.exists() && !force {
                bail!("{} already exists; pass --force to replace it", out.display());
            }
            let signer = Secp256k1Signer::generate();
            write_secret(&out, &signer.secret_hex())?;

            println!("Key generated successfully:");
            println!("  Key file: {}", out.display());
            println!("  Public Key: {}", signer.public_key_hex());
        }

        Commands::PublicKey { key } => {
            let signer = Secp256k1Signer::from_key_file(&key)?;
            println!("{}", signer.public_key_hex());
        }
    }

    Ok(())
}

fn write_secret(path: &Path, secret_hex: &str) -> Result<()> {
    std::fs::write(path, format!("{}\n", secret_hex))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }

    Ok(())
}
