//! Root credential bundle and its on-disk record.
//!
//! The bundle exists only once, in the initialization response. The file
//! written here is the sole durable copy, so the target path is checked
//! before initialization is attempted and the file is created exclusively
//! with owner-only permissions.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use super::types::SecretString;
use crate::errors::{BootstrapError, Result};

/// Root token and unseal shares produced by initialization
#[derive(Debug, Clone)]
pub struct RootCredentialBundle {
    pub root_token: SecretString,
    pub keys: Vec<SecretString>,
    pub keys_base64: Vec<SecretString>,
}

/// File layout: `{"token", "keys", "keys_base64"}` as strings. Several
/// shares are joined with commas, the same form `VAULT_KEYS` accepts.
#[derive(Serialize)]
struct CredentialsFile<'a> {
    token: &'a str,
    keys: String,
    keys_base64: String,
}

fn join_shares(shares: &[SecretString]) -> String {
    shares.iter().map(SecretString::expose_secret).collect::<Vec<_>>().join(",")
}

/// `<dir>/vault_root_creds_<DDMMYYYY>.json`
pub fn credentials_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("vault_root_creds_{}.json", date.format("%d%m%Y")))
}

/// Fail unless the credentials file can be created at `path`.
///
/// Called before initialization: an existing file is never overwritten and
/// a missing directory is reported while the store is still untouched.
pub fn ensure_writable(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(BootstrapError::Persistence {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "credentials file already exists; refusing to overwrite",
            ),
        });
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let metadata = std::fs::metadata(dir)
        .map_err(|source| BootstrapError::Persistence { path: dir.to_path_buf(), source })?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(BootstrapError::Persistence {
            path: dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "credentials directory is not writable",
            ),
        });
    }
    Ok(())
}

fn create_exclusive(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Write the bundle to `path` with 4-space indented JSON
pub fn persist(bundle: &RootCredentialBundle, path: &Path) -> Result<()> {
    let record = CredentialsFile {
        token: bundle.root_token.expose_secret(),
        keys: join_shares(&bundle.keys),
        keys_base64: join_shares(&bundle.keys_base64),
    };

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    record.serialize(&mut serializer).map_err(|e| BootstrapError::Serialization {
        source: e,
        context: "Failed to encode root credentials".to_string(),
    })?;

    let persistence = |source| BootstrapError::Persistence { path: path.to_path_buf(), source };
    let mut file = create_exclusive(path).map_err(persistence)?;
    file.write_all(&buffer).map_err(persistence)?;
    file.sync_all().map_err(persistence)?;

    tracing::info!(path = %path.display(), "Root token and unseal keys written");
    Ok(())
}
