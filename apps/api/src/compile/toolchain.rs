//! Toolchain discovery: finds the LaTeX compiler and its self-repair utility.
//!
//! Lookup order: `PATH`, then directories registered by earlier probes, then
//! the well-known installation directories. A probed directory that contains
//! the compiler is registered for the rest of the process lifetime, so later
//! lookups (including the repair utility) and spawned processes see it.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::info;

pub const DEFAULT_COMPILER: &str = "pdflatex";
pub const DEFAULT_REPAIR_TOOL: &str = "initexmf";

/// Directories discovered by probing, appended to `PATH` for every lookup.
static EXTRA_SEARCH_DIRS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compiler: String,
    /// `None` disables the repair-and-retry step.
    pub repair_tool: Option<String>,
    pub probe_dirs: Vec<PathBuf>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: DEFAULT_COMPILER.to_string(),
            repair_tool: Some(DEFAULT_REPAIR_TOOL.to_string()),
            probe_dirs: default_probe_dirs(),
        }
    }
}

impl Toolchain {
    /// Resolves the compiler executable, probing well-known directories when it
    /// is not on the search path.
    pub fn locate_compiler(&self) -> Option<PathBuf> {
        if let Some(path) = find_on_search_path(&self.compiler) {
            return Some(path);
        }

        for dir in &self.probe_dirs {
            if !dir.is_dir() {
                continue;
            }
            if let Ok(path) = which::which_in(&self.compiler, Some(dir), dir) {
                info!(
                    "Found {} at {}, adding to search path",
                    self.compiler,
                    dir.display()
                );
                register_search_dir(dir);
                return Some(path);
            }
        }

        None
    }

    pub fn locate_repair_tool(&self) -> Option<PathBuf> {
        self.repair_tool.as_deref().and_then(find_on_search_path)
    }
}

/// `PATH` followed by every registered directory, for lookups and child processes.
pub fn search_path() -> OsString {
    let system = env::var_os("PATH").unwrap_or_default();
    let mut dirs: Vec<PathBuf> = env::split_paths(&system).collect();
    dirs.extend(
        EXTRA_SEARCH_DIRS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned(),
    );
    env::join_paths(dirs).unwrap_or(system)
}

fn register_search_dir(dir: &Path) {
    let mut dirs = EXTRA_SEARCH_DIRS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !dirs.iter().any(|d| d == dir) {
        dirs.push(dir.to_path_buf());
    }
}

fn find_on_search_path(name: &str) -> Option<PathBuf> {
    which::which_in(name, Some(search_path()), Path::new(".")).ok()
}

#[cfg(windows)]
fn default_probe_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    // Per-user MiKTeX is the most common layout after a default install.
    if let Some(local) = env::var_os("LOCALAPPDATA") {
        let bin = PathBuf::from(local).join(r"Programs\MiKTeX\miktex\bin");
        dirs.push(bin.join("x64"));
        dirs.push(bin);
    }
    dirs.extend(
        [
            r"C:\Program Files\MiKTeX\miktex\bin\x64",
            r"C:\Program Files\MiKTeX 2.9\miktex\bin\x64",
            r"C:\texlive\2024\bin\windows",
            r"C:\texlive\2023\bin\windows",
            r"C:\texlive\2022\bin\windows",
        ]
        .into_iter()
        .map(PathBuf::from),
    );
    dirs
}

#[cfg(not(windows))]
fn default_probe_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/Library/TeX/texbin",
        "/usr/texbin",
        "/opt/homebrew/bin",
        "/usr/local/bin",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect();

    for year in ["2024", "2023", "2022"] {
        for arch in ["x86_64-linux", "aarch64-linux", "universal-darwin"] {
            dirs.push(PathBuf::from(format!("/usr/local/texlive/{year}/bin/{arch}")));
        }
    }
    dirs
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_missing_compiler_is_none() {
        let empty = tempfile::tempdir().unwrap();
        let toolchain = Toolchain {
            compiler: "no-such-typesetter-7f3a".to_string(),
            repair_tool: None,
            probe_dirs: vec![empty.path().to_path_buf(), PathBuf::from("/definitely/not/here")],
        };
        assert!(toolchain.locate_compiler().is_none());
        assert!(toolchain.locate_repair_tool().is_none());
    }

    #[test]
    #[serial]
    fn test_found_compiler_registers_directory_for_sibling_tools() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = write_executable(dir.path(), "found-latex-c41d");
        write_executable(dir.path(), "found-repair-c41d");

        let toolchain = Toolchain {
            compiler: "found-latex-c41d".to_string(),
            repair_tool: Some("found-repair-c41d".to_string()),
            probe_dirs: vec![dir.path().to_path_buf()],
        };

        // The repair tool is not on PATH until the compiler lookup registers its directory.
        assert!(toolchain.locate_repair_tool().is_none());
        assert_eq!(toolchain.locate_compiler(), Some(compiler));
        assert_eq!(
            toolchain.locate_repair_tool(),
            Some(dir.path().join("found-repair-c41d"))
        );

        let registered = env::split_paths(&search_path()).any(|p| p == dir.path());
        assert!(registered);
    }

    #[test]
    fn test_default_probe_dirs_are_absolute() {
        let dirs = default_probe_dirs();
        assert!(!dirs.is_empty());
        assert!(dirs.iter().all(|d| d.is_absolute()));
    }
}
