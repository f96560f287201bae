//! Executable Resolution
//!
//! Finds the CLI executable on PATH, in configured extra directories, or in
//! the npm global bin directory where `npm install -g` puts it.

use log::{debug, error, info};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extensions tried in every search directory
#[cfg(windows)]
const EXTENSIONS: &[&str] = &[".exe", ".cmd"];
#[cfg(not(windows))]
const EXTENSIONS: &[&str] = &[""];

/// Resolves a command name to a launchable path
#[derive(Debug, Clone, Default)]
pub struct CommandResolver {
    search_dirs: Vec<PathBuf>,
}

impl CommandResolver {
    /// Search the process PATH, then `extra_dirs`, then the npm global bin
    pub fn new(extra_dirs: &[PathBuf]) -> Self {
        let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        dirs.extend(extra_dirs.iter().cloned());
        if let Some(npm_bin) = npm_global_bin() {
            dirs.push(npm_bin);
        }
        Self::with_search_dirs(dirs)
    }

    /// Search exactly these directories (deduplicated, missing ones skipped)
    pub fn with_search_dirs(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut seen = HashSet::new();
        let search_dirs = dirs
            .into_iter()
            .filter(|d| !d.as_os_str().is_empty() && d.is_dir())
            .filter(|d| seen.insert(d.clone()))
            .collect();
        Self { search_dirs }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Resolve `command`. Falls back to the bare name so that the launch
    /// itself reports the missing executable.
    pub fn resolve(&self, command: &str) -> PathBuf {
        let as_path = Path::new(command);
        if as_path.components().count() > 1 || as_path.is_absolute() {
            return as_path.to_path_buf();
        }

        for dir in &self.search_dirs {
            for ext in EXTENSIONS {
                let candidate = dir.join(format!("{}{}", command, ext));
                if candidate.is_file() {
                    info!("Found executable: {}", candidate.display());
                    return candidate;
                }
            }
        }

        let joined: Option<OsString> = std::env::join_paths(&self.search_dirs).ok();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match which::which_in(command, joined, cwd) {
            Ok(path) => {
                debug!("Resolved {} via which: {}", command, path.display());
                path
            }
            Err(_) => {
                error!("Command not found: {} (tried {:?})", command, EXTENSIONS);
                PathBuf::from(command)
            }
        }
    }
}

/// npm's global bin directory for the current user
fn npm_global_bin() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_dir().map(|d| d.join("npm"))
    } else {
        dirs::home_dir().map(|d| d.join(".npm-global").join("bin"))
    }
}
