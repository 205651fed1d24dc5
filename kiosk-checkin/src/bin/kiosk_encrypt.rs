//! kiosk-encrypt - produce an `ENC:` password token for the env file
//!
//! Usage: `SECRET_KEY=... kiosk-encrypt <password>`

use anyhow::{bail, Context, Result};
use clap::Parser;
use kiosk_common::crypto;

#[derive(Parser, Debug)]
#[command(name = "kiosk-encrypt")]
#[command(about = "Encrypt a database password for the kiosk env file")]
#[command(version)]
struct Args {
    /// Plaintext password
    password: String,

    /// Encryption key; must match the service's SECRET_KEY
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Some(secret) = args.secret_key.filter(|s| !s.is_empty()) else {
        bail!("SECRET_KEY environment variable is required to encrypt");
    };

    let token = crypto::encrypt(&args.password, &secret).context("Encryption error")?;
    println!("{}", token);
    Ok(())
}
