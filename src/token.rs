//! Installation token — the bearer secret editor instances present on `/client`.
//!
//! The token is issued once per installation and kept in a local secret
//! file. Every editor instance on the machine reads the same file, so the
//! leader and its clients agree without any exchange.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("token file {0} is empty")]
    Empty(PathBuf),
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Read the token at `path`, issuing and storing a fresh one if the file
/// does not exist yet.
///
/// # Errors
///
/// Returns [`TokenError::Io`] when the file cannot be read or written, and
/// [`TokenError::Empty`] when an existing file holds no token.
pub fn load_or_create_token(path: &Path) -> Result<String, TokenError> {
    let io_err = |source| TokenError::Io { path: path.to_path_buf(), source };

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let token = contents.trim();
            if token.is_empty() {
                return Err(TokenError::Empty(path.to_path_buf()));
            }
            Ok(token.to_owned())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            let token = generate_token();
            write_secret(path, &token).map_err(io_err)?;
            info!(path = %path.display(), "token: issued installation token");
            Ok(token)
        }
        Err(e) => Err(io_err(e)),
    }
}

#[cfg(unix)]
fn write_secret(path: &Path, token: &str) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(token.as_bytes())
}

#[cfg(not(unix))]
fn write_secret(path: &Path, token: &str) -> io::Result<()> {
    std::fs::write(path, token)
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
