//! Configuration loading and validation.
//!
//! Settings are merged from three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a TOML config file (`$XDG_CONFIG_HOME/zotcopy/config.toml` by default,
//!    or an explicit path),
//! 3. `ZOTERO_*` environment variables (`ZOTERO_API_KEY`,
//!    `ZOTERO_LIBRARY_ID`, `ZOTERO_LIBRARY_TYPE`, `ZOTERO_DATA_DIR`,
//!    `ZOTERO_DESTINATION`).
//!
//! Nothing here talks to the network or the catalog: validation is limited
//! to "do we have the values the chosen mode of operation needs". Missing
//! credentials for the remote path, or a missing destination for a copy run,
//! are startup-time fatal errors — never per-record ones.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::{BaseDirs, ProjectDirs};
use exn::OptionExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether the library identifier names a personal or a shared library.
///
/// Selects the URL namespace on the remote API (`/users/{id}` vs
/// `/groups/{id}`); the local database reader never needs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    #[default]
    User,
    Group,
}

/// Merged application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Zotero Web API key. Required for the remote acquisition path only.
    pub api_key: Option<String>,
    /// Numeric library identifier. Optional even for remote acquisition:
    /// it can be auto-discovered from the API key.
    pub library_id: Option<String>,
    #[serde(default)]
    pub library_type: LibraryType,
    /// Zotero data directory (contains `zotero.sqlite` and `storage/`).
    /// Defaults to `~/Zotero`, which is where Zotero puts it on every
    /// platform we care about.
    pub data_dir: Option<PathBuf>,
    /// Destination root the deduplicated copies are written to.
    pub destination: Option<PathBuf>,
}

impl Settings {
    /// Load settings from defaults, the config file, and the environment.
    ///
    /// When `config_file` is `None` the platform config directory is probed;
    /// a missing file is fine (figment treats it as an empty layer), a
    /// present-but-invalid one is an error.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let path = match config_file {
            Some(explicit) => Some(explicit.to_path_buf()),
            None => default_config_file(),
        };
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            debug!(path = %path.display(), "merging configuration file");
            figment = figment.merge(Toml::file(path));
        }
        Ok(figment.merge(Env::prefixed("ZOTERO_")).extract().map_err(ErrorKind::Load)?)
    }

    /// The API key, required for remote acquisition.
    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => exn::bail!(ErrorKind::MissingValue("api_key", "ZOTERO_API_KEY")),
        }
    }

    /// The destination root, required for copy runs.
    pub fn destination(&self) -> Result<&Path> {
        match self.destination.as_deref() {
            Some(path) => Ok(path),
            None => exn::bail!(ErrorKind::MissingValue("destination", "ZOTERO_DESTINATION")),
        }
    }

    /// The Zotero data directory, falling back to `~/Zotero` and then to
    /// the legacy pre-5.0 location under the platform config directory
    /// (`%APPDATA%\Zotero\Zotero` on Windows).
    pub fn data_dir(&self) -> Result<PathBuf> {
        let base = BaseDirs::new().ok_or_raise(|| ErrorKind::NoHomeDir)?;
        Ok(resolve_data_dir(self.data_dir.as_deref(), base.home_dir(), base.config_dir()))
    }

    /// Path to the `zotero.sqlite` database inside the data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("zotero.sqlite"))
    }

    /// The attachment storage root inside the data directory.
    pub fn storage_root(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("storage"))
    }
}

/// Default config file location, if a config directory can be determined.
fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "zotcopy").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// An explicit setting always wins. Otherwise `<home>/Zotero`, unless it
/// doesn't exist and an old install left its data under
/// `<config>/Zotero/Zotero` instead.
fn resolve_data_dir(configured: Option<&Path>, home: &Path, config: &Path) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    let default = home.join("Zotero");
    if !default.exists() {
        let legacy = config.join("Zotero").join("Zotero");
        if legacy.exists() {
            return legacy;
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("does-not-exist.toml"))).unwrap();
        assert!(settings.api_key.is_none());
        assert_eq!(settings.library_type, LibraryType::User);
        assert!(settings.destination.is_none());
    }

    #[test]
    fn test_file_values_win_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "api_key = \"abc123\"\nlibrary_id = \"4567\"\nlibrary_type = \"group\"\ndestination = \"/tmp/out\""
        )
        .unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("abc123"));
        assert_eq!(settings.library_id.as_deref(), Some("4567"));
        assert_eq!(settings.library_type, LibraryType::Group);
        assert_eq!(settings.destination.as_deref(), Some(Path::new("/tmp/out")));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "library_type = \"library-of-congress\"").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_api_key_required_and_nonempty() {
        let settings = Settings::default();
        let err = settings.api_key().unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingValue("api_key", _)));
        let settings = Settings { api_key: Some(String::new()), ..Default::default() };
        assert!(settings.api_key().is_err());
        let settings = Settings { api_key: Some("k".into()), ..Default::default() };
        assert_eq!(settings.api_key().unwrap(), "k");
    }

    #[test]
    fn test_derived_paths() {
        let settings = Settings { data_dir: Some(PathBuf::from("/data/Zotero")), ..Default::default() };
        assert_eq!(settings.database_path().unwrap(), Path::new("/data/Zotero/zotero.sqlite"));
        assert_eq!(settings.storage_root().unwrap(), Path::new("/data/Zotero/storage"));
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let home = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        let dir = resolve_data_dir(Some(Path::new("/explicit/Zotero")), home.path(), config.path());
        assert_eq!(dir, Path::new("/explicit/Zotero"));
    }

    #[test]
    fn test_default_data_dir_under_home() {
        let home = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join("Zotero")).unwrap();
        let dir = resolve_data_dir(None, home.path(), config.path());
        assert_eq!(dir, home.path().join("Zotero"));
    }

    #[test]
    fn test_legacy_data_dir_when_default_absent() {
        let home = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        let legacy = config.path().join("Zotero").join("Zotero");
        std::fs::create_dir_all(&legacy).unwrap();
        let dir = resolve_data_dir(None, home.path(), config.path());
        assert_eq!(dir, legacy);
    }

    #[test]
    fn test_missing_everything_still_yields_home_default() {
        let home = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        let dir = resolve_data_dir(None, home.path(), config.path());
        assert_eq!(dir, home.path().join("Zotero"));
    }
}
