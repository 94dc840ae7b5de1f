// src/secrets.rs - Credential file sealing
//
// The server credential file lives on disk encrypted (AES-256-GCM) with a
// key held in an environment variable. An operator may drop a plaintext
// JSON file in place; it is sealed on first load. Decrypted credentials
// exist only in process memory.

use crate::client::ServerTarget;
use crate::error::{MonitorError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Decrypted contents of the credential file: one entry per monitored
/// server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDirectory {
    pub servers: Vec<ServerTarget>,
}

/// Load the server directory, sealing the file in place first if it is
/// still plaintext JSON. Fails if the environment key is unset, the key is
/// malformed, or the file cannot be decrypted or parsed.
pub fn load_server_directory(path: impl AsRef<Path>, env_key: &str) -> Result<ServerDirectory> {
    let path = path.as_ref();
    let key = key_from_env(env_key)?;

    if !is_sealed(path)? {
        info!(path = %path.display(), "credential file is plaintext, sealing it");
        seal_with_key(path, &key)?;
    }

    let plaintext = open_with_key(path, &key)?;
    let directory: ServerDirectory = serde_json::from_slice(&plaintext)?;
    Ok(directory)
}

/// Seal a plaintext credential file in place. No-op if already sealed.
pub fn seal_file(path: impl AsRef<Path>, env_key: &str) -> Result<()> {
    let path = path.as_ref();
    let key = key_from_env(env_key)?;
    if is_sealed(path)? {
        info!(path = %path.display(), "file is already sealed");
        return Ok(());
    }
    seal_with_key(path, &key)
}

/// Decrypt a sealed credential file back to plaintext for manual editing.
/// No-op if the file is already plaintext.
pub fn unseal_file_for_edit(path: impl AsRef<Path>, env_key: &str) -> Result<()> {
    let path = path.as_ref();
    let key = key_from_env(env_key)?;
    if !is_sealed(path)? {
        info!(path = %path.display(), "file is already plaintext");
        return Ok(());
    }
    let plaintext = open_with_key(path, &key)?;
    std::fs::write(path, plaintext)?;
    Ok(())
}

/// A file that parses as JSON is plaintext; anything else is assumed
/// sealed.
fn is_sealed(path: &Path) -> Result<bool> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice::<serde_json::Value>(&content).is_err())
}

fn key_from_env(env_key: &str) -> Result<LessSafeKey> {
    let encoded =
        std::env::var(env_key).map_err(|_| MonitorError::EnvKey(env_key.to_string()))?;
    let key_bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| MonitorError::Crypto(format!("key in {env_key} is not valid base64: {e}")))?;
    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
        .map_err(|_| MonitorError::Crypto(format!("key in {env_key} must be 32 bytes")))?;
    Ok(LessSafeKey::new(unbound))
}

fn seal_with_key(path: &Path, key: &LessSafeKey) -> Result<()> {
    let plaintext = std::fs::read(path)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| MonitorError::Crypto("failed to generate nonce".into()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext;
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| MonitorError::Crypto("encryption failed".into()))?;

    let mut sealed = nonce_bytes.to_vec();
    sealed.extend_from_slice(&in_out);
    std::fs::write(path, BASE64.encode(sealed))?;
    Ok(())
}

fn open_with_key(path: &Path, key: &LessSafeKey) -> Result<Vec<u8>> {
    let content = std::fs::read_to_string(path)?;
    let sealed = BASE64
        .decode(content.trim())
        .map_err(|e| MonitorError::Crypto(format!("sealed file is not valid base64: {e}")))?;

    if sealed.len() <= NONCE_LEN {
        return Err(MonitorError::Crypto("sealed file is truncated".into()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| MonitorError::Crypto("sealed file has a bad nonce".into()))?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| MonitorError::Crypto("decryption failed, wrong key or corrupted file".into()))?;
    Ok(plaintext.to_vec())
}
