//! Installer-side license seeding.
//!
//! Fingerprints the machine, requests a license from the licensing API and
//! persists the activation envelope, so the desktop app starts already
//! licensed. Prints the issued key; with `--output` it is also written to a
//! 0o600 file for the installer to pick up.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use rankbeam_license::{
    ActivationEnvelope, LicenseClient, LicenseStorage, machine_fingerprint,
};

#[derive(Parser)]
#[command(name = "rankbeam-seeder", about = "Request and persist a license for this machine")]
struct Args {
    /// Base URL of the licensing API
    #[arg(long, env = "LICENSE_API_URL")]
    api_base: String,

    /// Unique customer identifier (email or order number)
    #[arg(long)]
    customer: String,

    /// Installer shared secret
    #[arg(long, env = "LICENSE_API_TOKEN")]
    token: Option<String>,

    /// Also write the bare license key to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Store the envelope here instead of the platform config directory
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args).await {
        Ok(key) => {
            println!("{key}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("rankbeam-seeder: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<String, Box<dyn std::error::Error>> {
    if args.customer.trim().is_empty() {
        return Err("customer identifier is required".into());
    }

    let fingerprint = machine_fingerprint()?;
    let client = LicenseClient::new(&args.api_base, args.token.as_deref())?;
    let issued = client.request_license(&args.customer, &fingerprint).await?;

    let storage = match &args.config_dir {
        Some(dir) => LicenseStorage::with_dir(dir),
        None => LicenseStorage::new()?,
    };
    storage.save(&ActivationEnvelope {
        license_key: issued.license_key.clone(),
        customer_id: issued
            .customer_id
            .clone()
            .unwrap_or_else(|| args.customer.trim().to_string()),
        fingerprint,
        issued_at: issued.issued_at,
        expires_at: issued.expires_at,
    })?;

    if let Some(path) = &args.output {
        write_private(path, format!("{}\n", issued.license_key).as_bytes())?;
    }
    Ok(issued.license_key)
}

#[cfg(unix)]
fn write_private(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}
