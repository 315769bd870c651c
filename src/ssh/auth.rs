//! Private key loading
//!
//! Turns raw key material into a [`SigningIdentity`] for public key
//! authentication. An unencrypted parse is always attempted first; the
//! passphrase is only consulted when that fails.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use russh::keys::{decode_secret_key, HashAlg, PrivateKey};
use tracing::debug;

use crate::error::{AdminError, Result};

const PARSE_FAILURE: &str = "unparseable or wrong passphrase";

/// A decoded private key, owned by whoever derived it
#[derive(Clone)]
pub struct SigningIdentity {
    key: Arc<PrivateKey>,
}

impl SigningIdentity {
    /// Key algorithm name, e.g. `ssh-ed25519`
    pub fn algorithm(&self) -> String {
        self.key.algorithm().to_string()
    }

    /// SHA-256 fingerprint of the public half
    pub fn fingerprint(&self) -> String {
        self.key.public_key().fingerprint(HashAlg::Sha256).to_string()
    }

    pub(crate) fn key(&self) -> Arc<PrivateKey> {
        Arc::clone(&self.key)
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("algorithm", &self.algorithm())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Derive a signing identity from private key bytes
///
/// # Arguments
/// * `key_material` - PEM/OpenSSH encoded private key
/// * `passphrase` - Used only if the key does not parse unencrypted.
///   An empty passphrase counts as none.
///
/// # Returns
/// * `Ok(SigningIdentity)` - The decoded key
/// * `Err(AdminError::Authentication)` - Neither attempt produced a key
pub fn derive_identity(key_material: &[u8], passphrase: Option<&str>) -> Result<SigningIdentity> {
    let encoded = String::from_utf8_lossy(key_material);

    let plain_err = match decode_secret_key(&encoded, None) {
        Ok(key) => return Ok(identity(key)),
        Err(e) => e,
    };

    match passphrase.filter(|p| !p.is_empty()) {
        Some(passphrase) => {
            debug!("Key did not parse unencrypted, retrying with passphrase");
            decode_secret_key(&encoded, Some(passphrase))
                .map(identity)
                .map_err(|e| AdminError::auth(PARSE_FAILURE, e.to_string()))
        }
        None => Err(AdminError::auth(PARSE_FAILURE, plain_err.to_string())),
    }
}

/// Read a key file and derive a signing identity from it
///
/// A missing or unreadable file is reported as
/// [`AdminError::FileAccess`], never as an authentication failure.
pub async fn load_identity(path: &Path, passphrase: Option<&str>) -> Result<SigningIdentity> {
    let key_material = tokio::fs::read(path)
        .await
        .map_err(|e| AdminError::file(path, e))?;

    let identity = derive_identity(&key_material, passphrase)?;
    debug!(
        "Loaded {} key {} from {}",
        identity.algorithm(),
        identity.fingerprint(),
        path.display()
    );
    Ok(identity)
}

fn identity(key: PrivateKey) -> SigningIdentity {
    SigningIdentity { key: Arc::new(key) }
}
