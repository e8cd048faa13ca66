//! Logical channel names.
//!
//! Platforms without native named-pipe objects get a filesystem path under a
//! per-user directory in the system temp dir: `<tmp>/pipechan-<uid>/<name>`.

use std::fmt;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Mode for the per-user directory holding channel sockets.
const USER_DIR_MODE: u32 = 0o700;

/// A logical channel name resolved to its concrete socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeName {
    name: String,
    path: PathBuf,
}

impl PipeName {
    /// Resolve a logical name under the per-user runtime directory.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name)?;
        let path = user_dir().join(&name);
        Ok(Self { name, path })
    }

    /// Resolve a logical name under an explicit directory.
    pub fn in_dir(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name)?;
        let path = dir.as_ref().join(&name);
        Ok(Self { name, path })
    }

    /// Generate a fresh, collision-resistant name for a single channel instance.
    pub fn generate() -> Result<Self> {
        Self::new(format!("pipechan-{}-{:016x}", std::process::id(), rand_u64()))
    }

    /// The logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The concrete socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory (mode 0700) if it does not exist yet.
    pub(crate) fn ensure_parent(&self) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.exists() {
            return Ok(());
        }

        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(USER_DIR_MODE)
            .create(parent)
            .map_err(|e| TransportError::Bind {
                path: self.path.clone(),
                source: e,
            })?;

        // DirBuilder mode is filtered by umask; pin it explicitly.
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(USER_DIR_MODE)).map_err(
            |e| TransportError::Bind {
                path: self.path.clone(),
                source: e,
            },
        )?;
        let owner = std::fs::metadata(parent)
            .map_err(|e| TransportError::Bind {
                path: self.path.clone(),
                source: e,
            })?
            .uid();
        debug!(dir = ?parent, owner, "created channel directory");
        Ok(())
    }
}

impl fmt::Display for PipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn validate(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name.contains('/') {
        "name must not contain '/'"
    } else if name.contains('\0') {
        "name must not contain NUL"
    } else if name == "." || name == ".." {
        "name must not be a relative path component"
    } else {
        return Ok(());
    };

    Err(TransportError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

fn user_dir() -> PathBuf {
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    std::env::temp_dir().join(format!("pipechan-{uid}"))
}

/// Simple random u64 using system time and process ID.
fn rand_u64() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    nanos.wrapping_mul(0x517cc1b727220a95) ^ pid
}
