//! Secret storage.
//!
//! [`FileSecretStore`] keeps secrets in the `[secrets]` table of the config file,
//! editing it with `toml_edit` so comments and other settings survive. Writes go
//! through a temp file in the same directory and are renamed into place.

use std::collections::HashMap;
use std::{env, fs};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

/// Secret name under which the completion endpoint API key is stored.
pub const API_KEY_SECRET: &str = "quill.apiKey";

/// Environment variable consulted for the API key when no store has one.
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

const SECRETS_TABLE: &str = "secrets";

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("secret store at {} is not valid TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    #[error("could not determine the home directory")]
    NoHomeDir,
}

/// Configuration collaborator: named secret lookup and persistence.
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError>;

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError>;
}

impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        (**self).get_secret(key)
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        (**self).set_secret(key, value)
    }
}

/// Secrets persisted under `[secrets]` in a TOML file.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by `~/.quill/config.toml`.
    pub fn at_default_location() -> Result<Self, SecretStoreError> {
        crate::config_path()
            .map(Self::new)
            .ok_or(SecretStoreError::NoHomeDir)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<toml_edit::DocumentMut, SecretStoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        content
            .parse::<toml_edit::DocumentMut>()
            .map_err(|source| SecretStoreError::Parse {
                path: self.path.clone(),
                source,
            })
    }
}

impl SecretStore for FileSecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        let doc = self.read_document()?;
        Ok(doc
            .get(SECRETS_TABLE)
            .and_then(|table| table.get(key))
            .and_then(|item| item.as_str())
            .map(ToString::to_string))
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
            restrict_permissions(parent, 0o700)?;
        }

        let mut doc = self.read_document()?;
        if !doc.contains_key(SECRETS_TABLE) {
            doc[SECRETS_TABLE] = toml_edit::Item::Table(toml_edit::Table::new());
        }
        doc[SECRETS_TABLE][key] = toml_edit::value(value);

        write_owner_only(&self.path, doc.to_string().as_bytes())?;
        tracing::info!(path = %self.path.display(), secret = key, "Stored secret");
        Ok(())
    }
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Tighten `path` to `mode` if we own it and it is group/world accessible.
#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    let metadata = fs::metadata(path)?;
    // SAFETY: getuid has no preconditions and cannot fail.
    let our_uid = unsafe { libc::getuid() };
    if metadata.uid() == our_uid && metadata.permissions().mode() & 0o077 != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Process-local secrets.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secret(self, key: &str, value: &str) -> Self {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Overlay that answers from fallbacks when the inner store has nothing.
///
/// Lookup order: inner store, configured defaults, then `GEMINI_API_KEY` for the
/// API key secret. Writes always go to the inner store.
#[derive(Debug)]
pub struct EnvSecretStore<S> {
    inner: S,
    defaults: HashMap<String, String>,
}

impl<S: SecretStore> EnvSecretStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            defaults: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_default(mut self, key: &str, value: &str) -> Self {
        self.defaults.insert(key.to_string(), value.to_string());
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

impl<S: SecretStore> SecretStore for EnvSecretStore<S> {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        if let Some(value) = self.inner.get_secret(key)?.and_then(non_blank) {
            return Ok(Some(value));
        }
        if let Some(value) = self.defaults.get(key).cloned().and_then(non_blank) {
            return Ok(Some(value));
        }
        if key == API_KEY_SECRET {
            return Ok(env::var(API_KEY_ENV_VAR).ok().and_then(non_blank));
        }
        Ok(None)
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        self.inner.set_secret(key, value)
    }
}
