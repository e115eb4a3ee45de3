//! Discovery of external helper binaries (yt-dlp, ffmpeg)
//!
//! Search order:
//! 1. Next to the running executable (for bundled deployments)
//! 2. System PATH
//! 3. Common installation paths (Homebrew, pip user installs, ...)

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Find a helper binary by name
pub fn find_binary(name: &str) -> Option<PathBuf> {
    if let Some(bundled) = find_bundled(name) {
        info!("✓ Using bundled {}: {:?}", name, bundled);
        return Some(bundled);
    }

    if let Some(system) = find_in_path(name) {
        info!("✓ Using system {}: {:?}", name, system);
        return Some(system);
    }

    if let Some(common) = find_in_common_paths(name) {
        info!("✓ Using {} from common path: {:?}", name, common);
        return Some(common);
    }

    warn!("✗ {} not found anywhere!", name);
    None
}

/// Resolve an explicitly configured path, falling back to discovery
pub fn resolve_binary(configured: Option<&Path>, name: &str) -> Option<PathBuf> {
    match configured {
        Some(path) if is_executable(path) => Some(path.to_path_buf()),
        Some(path) => {
            warn!(
                "Configured {} at {:?} is not executable, searching instead",
                name, path
            );
            find_binary(name)
        }
        None => find_binary(name),
    }
}

/// Ask a binary for its version string
pub fn binary_version(path: &Path, flag: &str) -> Option<String> {
    let output = Command::new(path).arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

fn find_bundled(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    let candidate = exe_dir.join(name);
    debug!("Checking bundled path: {:?}", candidate);
    if candidate.is_file() && is_executable(&candidate) {
        return Some(candidate);
    }

    None
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    which::which(name).ok().filter(|path| path.exists())
}

fn find_in_common_paths(name: &str) -> Option<PathBuf> {
    let mut candidates = vec![
        // macOS Homebrew (Apple Silicon)
        PathBuf::from("/opt/homebrew/bin").join(name),
        // macOS Homebrew (Intel) / manual installs
        PathBuf::from("/usr/local/bin").join(name),
        // System
        PathBuf::from("/usr/bin").join(name),
    ];

    // pip --user installs
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join(name));
    }

    candidates
        .into_iter()
        .find(|path| path.exists() && is_executable(path))
}

/// Check if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        // On Windows, just check if file exists
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_ytdlp() {
        let result = find_binary("yt-dlp");
        println!("yt-dlp found at: {:?}", result);
        // Don't assert - yt-dlp might not be installed in CI
    }

    #[test]
    fn test_find_missing_binary() {
        assert!(find_binary("streamgrab-definitely-not-installed").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable() {
        let path = PathBuf::from("/bin/sh");
        if path.exists() {
            assert!(is_executable(&path));
        }
        assert!(!is_executable(Path::new("/nonexistent/binary")));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_prefers_configured_path() {
        let path = PathBuf::from("/bin/sh");
        if path.exists() {
            assert_eq!(resolve_binary(Some(&path), "sh"), Some(path));
        }
    }
}
