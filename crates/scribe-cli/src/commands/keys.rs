//! Key management commands.

use anyhow::{Context, Result};
use colored::Colorize;
use scribe_chain::signer;
use std::fs;
use std::path::{Path, PathBuf};

pub const PRIVATE_KEY_FILE: &str = "scribe.key";
pub const PUBLIC_KEY_FILE: &str = "scribe.pub";

/// Handle the `scribe keygen` command.
pub fn cmd_keygen(passphrase: &str, out_dir: Option<PathBuf>) -> Result<()> {
    let keys = signer::generate_keypair(passphrase).context("failed to generate keypair")?;
    let fingerprint = signer::load_public_key(&keys.public_key)
        .context("generated public key does not parse")?
        .fingerprint();

    match out_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let private_path = dir.join(PRIVATE_KEY_FILE);
            let public_path = dir.join(PUBLIC_KEY_FILE);
            write_private(&private_path, &keys.private_key)?;
            fs::write(&public_path, &keys.public_key)
                .with_context(|| format!("failed to write {}", public_path.display()))?;

            println!("{} Private key written to {}", "✓".green(), private_path.display());
            println!("{} Public key written to {}", "✓".green(), public_path.display());
        }
        None => {
            println!("{}", "Generated Ed25519 Keypair".bold().underline());
            println!("{}", keys.private_key.trim_end());
            println!("{}", keys.public_key.trim_end());
            println!();
            println!(
                "{}",
                "WARNING: Keep the private key and its passphrase secret!"
                    .yellow()
                    .bold()
            );
        }
    }
    println!("{}: {}", "Fingerprint".bold(), fingerprint);

    Ok(())
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}
