//! Downloads directory resolution
//!
//! Relative paths are resolved against the working directory once, at startup,
//! so log lines and later lookups always see an absolute path.

use crate::utils::error::StreamgrabError;
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Expand a leading `~` and make the path absolute
pub fn resolve_dir(dir: &Path) -> Result<PathBuf, StreamgrabError> {
    let expanded = match dir.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| dir.to_path_buf()),
        Err(_) => dir.to_path_buf(),
    };

    Ok(expanded.absolutize()?.into_owned())
}

/// Create the downloads directory if absent and return its absolute path
pub fn ensure_downloads_dir(dir: &Path) -> Result<PathBuf, StreamgrabError> {
    let dir = resolve_dir(dir)?;

    if dir.is_dir() {
        debug!("Downloads directory: {:?}", dir);
    } else {
        std::fs::create_dir_all(&dir)?;
        info!("Created downloads directory {:?}", dir);
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_dir_becomes_absolute() {
        let path = resolve_dir(Path::new("./downloads")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("downloads"));
        assert!(!path.to_string_lossy().contains("/./"));
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            let path = resolve_dir(Path::new("~/media")).unwrap();
            assert_eq!(path, home.join("media"));
        }
    }

    #[test]
    fn test_creates_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nested").join("downloads");

        let created = ensure_downloads_dir(&target).unwrap();
        assert!(created.is_dir());
        assert_eq!(created, target);

        // Second call is a no-op
        assert_eq!(ensure_downloads_dir(&target).unwrap(), target);
    }

    #[test]
    fn test_file_in_the_way_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("downloads");
        std::fs::write(&target, b"not a directory").unwrap();

        assert!(matches!(
            ensure_downloads_dir(&target),
            Err(StreamgrabError::IoError(_))
        ));
    }
}
