//! Persistent bearer-token storage.
//!
//! The client is single-session: at most one credential is live at a time.
//! Every store operation is idempotent so that logout and concurrent 401
//! handling can clear freely.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::errors::ClientError;

/// Opaque bearer token proving an authenticated identity to the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<Credential>;

    fn store(&self, credential: &Credential) -> Result<(), ClientError>;

    fn clear(&self) -> Result<(), ClientError>;

    /// Clear only if the stored credential equals `expected`.
    ///
    /// Returns true when the store no longer holds `expected`, whether it was
    /// removed now or was already gone.
    fn clear_if(&self, expected: &Credential) -> Result<bool, ClientError>;
}

/// Single-file store; the file content is the token.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data_dir>/trellis/token`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trellis")
            .join("token")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<Credential> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                (!token.is_empty()).then(|| Credential::new(token))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read credential file");
                None
            }
        }
    }

    fn remove(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Credential(e)),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credential> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read()
    }

    fn store(&self, credential: &Credential) -> Result<(), ClientError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ClientError::Credential)?;
        }
        std::fs::write(&self.path, credential.as_str()).map_err(ClientError::Credential)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(ClientError::Credential)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove()
    }

    fn clear_if(&self, expected: &Credential) -> Result<bool, ClientError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.read() {
            Some(current) if &current == expected => {
                self.remove()?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }
}

/// In-process store for tests and embedders that manage persistence themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credential> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, credential: &Credential) -> Result<(), ClientError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }

    fn clear_if(&self, expected: &Credential) -> Result<bool, ClientError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(current) if current == expected => {
                *slot = None;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }
}
