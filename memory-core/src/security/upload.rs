//! Upload sandbox validation for remote file ingestion.
//!
//! Remote clients stage files into a known sandbox directory and then ask
//! the server to ingest them by path. The guard validates every supplied
//! path: symlinks are resolved and the realpath must stay inside the
//! sandbox's realpath, the target must be a readable regular file, and it
//! must fit the size cap.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::error::{Error, Result};

/// Validates caller-supplied paths against the upload sandbox.
pub struct RemoteUploadGuard {
    config: UploadConfig,
}

impl RemoteUploadGuard {
    #[must_use]
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Create the sandbox directory if missing (owner-only on unix).
    pub fn ensure_directory(&self) -> Result<PathBuf> {
        let dir = &self.config.directory;
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            {
                warn!(dir = %dir.display(), error = %e, "failed to restrict upload dir permissions");
            }
        }
        Ok(dir.clone())
    }

    /// Validate a supplied path and return its canonical form.
    ///
    /// Every rejection maps to `UploadRejected` with an operator-readable
    /// reason.
    pub fn validate(&self, file_path: &Path) -> Result<PathBuf> {
        if !self.config.enabled {
            return Err(Error::UploadRejected(
                "Remote file upload is disabled".to_string(),
            ));
        }

        let sandbox = self.ensure_directory()?;
        let sandbox_real = std::fs::canonicalize(&sandbox)
            .map_err(|e| Error::storage_at(&sandbox, e))?;

        // Canonicalization resolves symlinks and fails on missing files.
        let real_path = std::fs::canonicalize(file_path).map_err(|_| {
            Error::UploadRejected(format!("File not found: {}", file_path.display()))
        })?;

        if !real_path.starts_with(&sandbox_real) {
            return Err(Error::UploadRejected(format!(
                "File path must be within upload directory: {}",
                sandbox_real.display()
            )));
        }

        let metadata = std::fs::metadata(&real_path).map_err(|_| {
            Error::UploadRejected(format!("File not readable: {}", real_path.display()))
        })?;
        if !metadata.is_file() {
            return Err(Error::UploadRejected(format!(
                "Not a regular file: {}",
                real_path.display()
            )));
        }

        let max_bytes = self.config.max_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
            return Err(Error::UploadRejected(format!(
                "File too large: {size_mb:.1}MB (max: {}MB)",
                self.config.max_size_mb
            )));
        }

        if std::fs::File::open(&real_path).is_err() {
            return Err(Error::UploadRejected(format!(
                "File not readable: {}",
                real_path.display()
            )));
        }

        debug!(path = %real_path.display(), "upload path validated");
        Ok(real_path)
    }

    /// Whether a (canonical) path sits inside the sandbox.
    #[must_use]
    pub fn is_sandboxed(&self, real_path: &Path) -> bool {
        std::fs::canonicalize(&self.config.directory)
            .map(|sandbox| real_path.starts_with(sandbox))
            .unwrap_or(false)
    }

    /// Remove sandbox files older than `max_age_seconds`.
    pub fn cleanup_old_uploads(&self) -> Result<usize> {
        let dir = self.ensure_directory()?;
        let max_age = Duration::from_secs(self.config.max_age_seconds);
        let now = SystemTime::now();
        let mut removed = 0usize;

        for entry in std::fs::read_dir(&dir)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else { continue };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_some_and(|age| age > max_age) {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        info!(path = %path.display(), "cleaned up old upload");
                        removed += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to clean up upload"),
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard(dir: &TempDir, enabled: bool) -> RemoteUploadGuard {
        RemoteUploadGuard::new(UploadConfig {
            enabled,
            directory: dir.path().join("uploads"),
            max_age_seconds: 3600,
            max_size_mb: 1,
        })
    }

    #[test]
    fn sandboxed_file_validates() {
        let dir = TempDir::new().unwrap();
        let guard = guard(&dir, true);
        guard.ensure_directory().unwrap();

        let file = dir.path().join("uploads/doc.md");
        std::fs::write(&file, "content").unwrap();

        let real = guard.validate(&file).unwrap();
        assert!(real.ends_with("doc.md"));
        assert!(guard.is_sandboxed(&real));
    }

    #[test]
    fn paths_outside_sandbox_are_rejected() {
        let dir = TempDir::new().unwrap();
        let guard = guard(&dir, true);

        let outside = dir.path().join("outside.md");
        std::fs::write(&outside, "content").unwrap();

        let err = guard.validate(&outside).unwrap_err();
        assert_eq!(err.kind(), "UploadRejected");
        assert!(err.to_string().contains("within upload directory"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escapes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let guard = guard(&dir, true);
        guard.ensure_directory().unwrap();

        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "secret").unwrap();
        let link = dir.path().join("uploads/link.txt");
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        let err = guard.validate(&link).unwrap_err();
        assert_eq!(err.kind(), "UploadRejected");
    }

    #[test]
    fn disabled_guard_rejects_everything() {
        let dir = TempDir::new().unwrap();
        let guard = guard(&dir, false);
        let err = guard.validate(Path::new("/anything")).unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn oversized_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        let guard = guard(&dir, true);
        guard.ensure_directory().unwrap();

        let file = dir.path().join("uploads/big.bin");
        std::fs::write(&file, vec![0u8; 2 * 1024 * 1024]).unwrap();

        let err = guard.validate(&file).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn missing_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        let guard = guard(&dir, true);
        let err = guard.validate(&dir.path().join("uploads/absent.md")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn cleanup_removes_only_stale_files() {
        let dir = TempDir::new().unwrap();
        let guard = RemoteUploadGuard::new(UploadConfig {
            enabled: true,
            directory: dir.path().join("uploads"),
            max_age_seconds: 0,
            max_size_mb: 1,
        });
        guard.ensure_directory().unwrap();
        let file = dir.path().join("uploads/stale.md");
        std::fs::write(&file, "old").unwrap();

        // Any mtime is older than a zero-second max age.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let removed = guard.cleanup_old_uploads().unwrap();
        assert_eq!(removed, 1);
        assert!(!file.exists());
    }
}
