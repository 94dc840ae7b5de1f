//! Seal or unseal the server credential file.
//!
//! Usage: seal-credentials <seal|unseal> <file> <env-key-name>
//!
//! `unseal` decrypts the file in place for manual editing; run `seal`
//! afterwards (or just start the daemon, which seals plaintext files on
//! load).

use uamon::secrets;
use uamon::{MonitorError, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().collect();
    let (command, path, env_key) = match args.as_slice() {
        [_, command, path, env_key] => (command.as_str(), path, env_key),
        _ => {
            eprintln!("Usage: seal-credentials <seal|unseal> <file> <env-key-name>");
            std::process::exit(2);
        }
    };

    match command {
        "seal" => secrets::seal_file(path, env_key),
        "unseal" => secrets::unseal_file_for_edit(path, env_key),
        other => Err(MonitorError::Config(format!("unknown command '{other}'"))),
    }
}
