//! Browser profile locking
//!
//! A persistent profile directory may only be driven by one run at a time.
//! The lock is a marker file created with `create_new`, so a second run
//! fails fast with [`SitepilotError::ProfileLocked`] instead of fighting the
//! first over the browser's own profile lock.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::{Result, SitepilotError};

/// Held for the duration of a run; removes its marker on drop
#[derive(Debug)]
pub struct ProfileLock {
    path: PathBuf,
}

impl ProfileLock {
    /// Marker file name inside the profile directory
    pub const FILE_NAME: &'static str = ".sitepilot.lock";

    /// Acquire the lock for `profile_dir`, creating the directory if needed
    pub fn acquire(profile_dir: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(profile_dir)?;
        let path = profile_dir.join(Self::FILE_NAME);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "pid={} run={}", std::process::id(), run_id)?;
                debug!(path = %path.display(), "acquired profile lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown holder".to_string());
                Err(SitepilotError::ProfileLocked {
                    path: profile_dir.to_path_buf(),
                    holder,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProfileLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release profile lock");
        }
    }
}
