//! `.env` loading
//!
//! Values already present in the process environment win over values from
//! the file; dotenvy never overwrites.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{EnvError, Result};

/// Load `./.env` (searching parent directories) if one exists.
///
/// Returns the path that was loaded, or `None` when no file was found.
pub fn load_dotenv() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    load_dotenv_from(&cwd)
}

/// Load the nearest `.env` in `dir` or one of its ancestors.
pub fn load_dotenv_from(dir: &Path) -> Option<PathBuf> {
    let path = dir
        .ancestors()
        .map(|d| d.join(".env"))
        .find(|candidate| candidate.is_file())?;

    match dotenvy::from_path(&path) {
        Ok(()) => {
            debug!("Loaded .env from {}", path.display());
            Some(path)
        }
        Err(e) => {
            debug!("No .env loaded from {}: {}", path.display(), e);
            None
        }
    }
}

/// Load an explicitly named env file. Unlike [`load_dotenv`], a missing or
/// malformed file is an error.
pub fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path(path).map_err(|source| EnvError::DotEnv {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded env file {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_dotenv_from_finds_nearest_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(&env_path, "APPENV_DOTENV_ANCESTOR_TEST=found\n").unwrap();
        let nested = dir.path().join("service").join("bin");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(load_dotenv_from(&nested), Some(env_path));
        assert_eq!(
            std::env::var("APPENV_DOTENV_ANCESTOR_TEST").as_deref(),
            Ok("found")
        );
    }

    #[test]
    fn test_malformed_dotenv_is_not_reported_as_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "NOT A VALID LINE\n").unwrap();

        assert_eq!(load_dotenv_from(dir.path()), None);
    }

    #[test]
    fn test_missing_env_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(&dir.path().join("absent.env")).unwrap_err();
        assert!(matches!(err, EnvError::DotEnv { .. }));
    }

    #[test]
    fn test_env_file_sets_unset_vars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(&path, "APPENV_CONFIG_TEST_ONLY=from-file\n").unwrap();

        load_env_file(&path).unwrap();
        assert_eq!(
            std::env::var("APPENV_CONFIG_TEST_ONLY").as_deref(),
            Ok("from-file")
        );
    }
}
