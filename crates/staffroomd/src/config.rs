use serde::Deserialize;
use staffroom_core::places::{DEFAULT_DESTINATIONS, DEFAULT_ROOM};
use staffroom_core::{Places, MATCH_THRESHOLD};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "/etc/staffroom/staffroomd.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(format!("unknown bus {other:?} (expected session or system)")),
        }
    }
}

/// Daemon configuration: optional TOML file, then `STAFFROOM_*` environment
/// overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database file. Left empty, it resolves to
    /// `$XDG_DATA_HOME/staffroom/staffroom.db` at load time.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f64,
    /// Canonical name of the shared room.
    pub room_name: String,
    /// Destinations offered when a scan checks someone out; the first is the default.
    pub places: Vec<String>,
    /// Seconds an unanswered destination prompt stays open.
    pub prompt_timeout_secs: u64,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::new(),
            match_threshold: MATCH_THRESHOLD,
            room_name: DEFAULT_ROOM.to_string(),
            places: DEFAULT_DESTINATIONS.iter().map(|p| p.to_string()).collect(),
            prompt_timeout_secs: 60,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load from the file named by `STAFFROOM_CONFIG` (or the system default
    /// if it exists), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&|key: &str| std::env::var(key).ok())
    }

    fn load_with(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env("STAFFROOM_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::defaults_with(env),
        };
        config.apply_overrides(env)?;
        if config.db_path.as_os_str().is_empty() {
            config.db_path = default_db_path(env);
        }
        config.validate()?;
        Ok(config)
    }

    fn defaults_with(env: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            db_path: default_db_path(env),
            ..Self::default()
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&src).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse TOML; keys missing from the file keep their defaults.
    fn from_toml(src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(src)
    }

    fn apply_overrides(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = env("STAFFROOM_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = env("STAFFROOM_MATCH_THRESHOLD") {
            self.match_threshold = parse("STAFFROOM_MATCH_THRESHOLD", &v)?;
        }
        if let Some(v) = env("STAFFROOM_ROOM_NAME") {
            self.room_name = v;
        }
        if let Some(v) = env("STAFFROOM_PLACES") {
            self.places = v.split(',').map(|p| p.trim().to_string()).collect();
        }
        if let Some(v) = env("STAFFROOM_PROMPT_TIMEOUT_SECS") {
            self.prompt_timeout_secs = parse("STAFFROOM_PROMPT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("STAFFROOM_BUS") {
            self.bus = parse("STAFFROOM_BUS", &v)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                key: "match_threshold",
                reason: format!("{} is not a non-negative distance", self.match_threshold),
            });
        }
        Ok(())
    }

    /// Room and destinations; blank entries fall back to the defaults.
    pub fn places(&self) -> Places {
        Places::new(self.room_name.clone(), self.places.clone())
    }

    pub fn prompt_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.prompt_timeout_secs.min(u64::from(u32::MAX)) as i64)
    }
}

fn default_db_path(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("staffroom")
        .join("staffroom.db")
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let env = env_of(&[("HOME", "/home/kiosk")]);
        let config = Config::defaults_with(&env);
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/kiosk/.local/share/staffroom/staffroom.db")
        );
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.room_name, "Staff Room");
        assert_eq!(config.places.len(), 6);
        assert_eq!(config.bus, BusKind::Session);
        assert_eq!(config.places(), Places::default());
    }

    #[test]
    fn test_xdg_data_home() {
        let env = env_of(&[("XDG_DATA_HOME", "/var/lib")]);
        let config = Config::defaults_with(&env);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/staffroom/staffroom.db"));
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("HOME", "/home/kiosk"),
            ("STAFFROOM_DB_PATH", "/srv/staff.db"),
            ("STAFFROOM_MATCH_THRESHOLD", "0.45"),
            ("STAFFROOM_PLACES", "Office, Library ,"),
            ("STAFFROOM_PROMPT_TIMEOUT_SECS", "15"),
            ("STAFFROOM_BUS", "System"),
        ]);
        let mut config = Config::defaults_with(&env);
        config.apply_overrides(&env).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/srv/staff.db"));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.prompt_timeout(), chrono::Duration::seconds(15));
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.places().destinations(), ["Office", "Library"]);
    }

    #[test]
    fn test_bad_env_value() {
        let env = env_of(&[("STAFFROOM_MATCH_THRESHOLD", "close")]);
        let mut config = Config::defaults_with(&env);
        let err = config.apply_overrides(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STAFFROOM_MATCH_THRESHOLD", .. }));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let env = env_of(&[("STAFFROOM_MATCH_THRESHOLD", "-1")]);
        let mut config = Config::defaults_with(&env);
        config.apply_overrides(&env).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file() {
        let src = "room_name = \"Faculty Lounge\"\n\
                   places = [\"Canteen\", \"Library\"]\n\
                   bus = \"system\"\n";
        let config = Config::from_toml(src).unwrap();
        assert_eq!(config.room_name, "Faculty Lounge");
        assert_eq!(config.places().default_destination(), "Canteen");
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.prompt_timeout_secs, 60);
        assert_eq!(config.bus, BusKind::System);
        assert!(config.db_path.as_os_str().is_empty());
    }

    #[test]
    fn test_load_resolves_data_dir_after_file() {
        let path = std::env::temp_dir()
            .join(format!("staffroomd-config-{}.toml", std::process::id()));
        std::fs::write(&path, "room_name = \"Faculty Lounge\"\n").unwrap();
        let path_str = path.display().to_string();
        let env = env_of(&[
            ("STAFFROOM_CONFIG", path_str.as_str()),
            ("XDG_DATA_HOME", "/var/lib"),
        ]);

        let config = Config::load_with(&env);
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();
        assert_eq!(config.room_name, "Faculty Lounge");
        assert_eq!(config.db_path, PathBuf::from("/var/lib/staffroom/staffroom.db"));
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        assert!(Config::from_toml("threshold = 0.5\n").is_err());
    }
}
