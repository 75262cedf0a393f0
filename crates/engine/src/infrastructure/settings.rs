//! Engine settings read from the environment.

use std::path::PathBuf;

use questline_domain::DefeatPenalty;

/// Upper bound on turns a single auto-combat call may resolve.
pub const DEFAULT_MAX_AUTO_TURNS: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime configuration of the engine binary.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub server_host: String,
    pub server_port: u16,
    /// SQLite path for activity sessions; `:memory:` keeps them in memory.
    pub session_db: String,
    /// JSON catalog to load instead of the built-in one.
    pub catalog_path: Option<PathBuf>,
    pub defeat_penalty: DefeatPenalty,
    pub cors_allowed_origins: Option<String>,
    /// Seed for reproducible rolls. Unset means system randomness.
    pub random_seed: Option<u64>,
    pub max_auto_turns: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            session_db: "sessions.db".into(),
            catalog_path: None,
            defeat_penalty: DefeatPenalty::default(),
            cors_allowed_origins: None,
            random_seed: None,
            max_auto_turns: DEFAULT_MAX_AUTO_TURNS,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let server_port = match lookup("SERVER_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw.trim().parse().map_err(|_| SettingsError::Invalid {
                key: "SERVER_PORT",
                message: format!("'{}' is not a port number", raw),
            })?,
            None => defaults.server_port,
        };

        let defeat_penalty = match lookup("DEFEAT_PENALTY") {
            Some(raw) => raw.parse().map_err(|e: questline_domain::DomainError| {
                SettingsError::Invalid {
                    key: "DEFEAT_PENALTY",
                    message: e.to_string(),
                }
            })?,
            None => defaults.defeat_penalty,
        };

        let random_seed = match lookup("RANDOM_SEED") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| SettingsError::Invalid {
                key: "RANDOM_SEED",
                message: format!("'{}' is not an unsigned integer", raw),
            })?),
            None => None,
        };

        let max_auto_turns = match lookup("MAX_AUTO_TURNS") {
            Some(raw) => raw
                .trim()
                .parse()
                .ok()
                .filter(|turns: &u32| *turns > 0)
                .ok_or_else(|| SettingsError::Invalid {
                    key: "MAX_AUTO_TURNS",
                    message: format!("'{}' is not a positive integer", raw),
                })?,
            None => defaults.max_auto_turns,
        };

        Ok(Self {
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port,
            session_db: lookup("SESSION_DB").unwrap_or(defaults.session_db),
            catalog_path: lookup("CATALOG_PATH").map(PathBuf::from),
            defeat_penalty,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS"),
            random_seed,
            max_auto_turns,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.session_db == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_environment_gives_defaults() {
        let settings = EngineSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.defeat_penalty, DefeatPenalty::GoldLoss { percent: 10 });
        assert!(!settings.uses_memory_store());
    }

    #[test]
    fn values_are_parsed() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("SESSION_DB", ":memory:"),
            ("DEFEAT_PENALTY", "permadeath"),
            ("RANDOM_SEED", "7"),
            ("CATALOG_PATH", "/srv/catalog.json"),
        ]))
        .unwrap();

        assert_eq!(settings.server_port, 8080);
        assert!(settings.uses_memory_store());
        assert_eq!(settings.defeat_penalty, DefeatPenalty::Permadeath);
        assert_eq!(settings.random_seed, Some(7));
        assert_eq!(settings.catalog_path, Some(PathBuf::from("/srv/catalog.json")));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(EngineSettings::from_lookup(lookup(&[("SERVER_PORT", "http")])).is_err());
        assert!(EngineSettings::from_lookup(lookup(&[("DEFEAT_PENALTY", "exile")])).is_err());
        assert!(EngineSettings::from_lookup(lookup(&[("MAX_AUTO_TURNS", "0")])).is_err());
    }
}
