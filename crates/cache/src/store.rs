//! Key-value persistence, one JSON file per key.
//!
//! Records live under `~/.config/hublink/cache/` (`XDG_CONFIG_HOME`
//! respected on Linux, `APPDATA` on Windows).

use std::path::{Path, PathBuf};

use crate::CacheError;

/// Persistent string key-value store.
pub trait KvStore: Send + Sync {
    /// Returns the stored value, `None` when the key has never been set.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value, replacing any previous one atomically.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Disk-backed [`KvStore`].
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    /// Opens the store in the platform config directory, creating it if
    /// needed.
    pub fn new() -> Result<Self, CacheError> {
        let base = config_dir().ok_or(CacheError::NoConfigDir)?;
        Self::with_base(&cache_dir_in(&base))
    }

    /// Opens the store rooted at an explicit directory.
    pub fn with_base(base: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(base)?;
        Ok(Self {
            base: base.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{}.json", sanitize_key(key)))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        // Write-then-rename so readers never observe a partial record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Maps a key to a safe filename component.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn cache_dir_in(config_base: &Path) -> PathBuf {
    config_base.join("hublink").join("cache")
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
