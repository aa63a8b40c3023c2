use crate::core::{DbError, Result};
use crate::service::SavePolicy;
use crate::storage::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const URL_SCHEME: &str = "reservadb://";
const URL_RESERVED: &[char] = &['?', '&', '=', '#'];

/// Store configuration
///
/// Built with the builder methods, parsed from a connection URL, or
/// deserialized from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database name, used in logs and URLs
    pub database: String,

    /// How `ReservationService::save` handles insert/update
    pub save_policy: SavePolicy,

    /// First value handed out by the identity sequence
    pub identity_start: i64,

    /// Where checkpoints are written; `None` keeps the store memory-only
    pub snapshot_path: Option<PathBuf>,

    pub durability: DurabilityMode,
}

impl StoreConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            save_policy: SavePolicy::default(),
            identity_start: 1,
            snapshot_path: None,
            durability: DurabilityMode::default(),
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn save_policy(mut self, policy: SavePolicy) -> Self {
        self.save_policy = policy;
        self
    }

    pub fn identity_start(mut self, start: i64) -> Self {
        self.identity_start = start;
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Parse from connection string
    ///
    /// Format: `reservadb://database?save_policy=strict&identity_start=1&snapshot=/path&durability=on_commit`
    ///
    /// # Examples
    ///
    /// ```
    /// use reservadb::{SavePolicy, StoreConfig};
    ///
    /// let config = StoreConfig::from_url(
    ///     "reservadb://bookings?save_policy=insert_then_update&identity_start=100"
    /// ).unwrap();
    /// assert_eq!(config.database, "bookings");
    /// assert_eq!(config.save_policy, SavePolicy::InsertThenUpdate);
    /// assert_eq!(config.identity_start, 100);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix(URL_SCHEME).ok_or_else(|| {
            DbError::ConfigError(format!("URL must start with '{}'", URL_SCHEME))
        })?;

        let (database, query) = match rest.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::new(database);

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DbError::ConfigError(format!("Invalid parameter '{}'", pair)))?;

            match key {
                "save_policy" => config.save_policy = value.parse()?,
                "identity_start" => {
                    config.identity_start = value.parse().map_err(|_| {
                        DbError::ConfigError(format!("Invalid identity_start '{}'", value))
                    })?;
                }
                "snapshot" => config.snapshot_path = Some(PathBuf::from(value)),
                "durability" => {
                    config.durability = match value {
                        "none" => DurabilityMode::None,
                        "on_commit" => DurabilityMode::OnCommit,
                        other => {
                            return Err(DbError::ConfigError(format!(
                                "Unknown durability mode '{}'",
                                other
                            )));
                        }
                    };
                }
                other => {
                    return Err(DbError::ConfigError(format!("Unknown parameter '{}'", other)));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "{}{}?save_policy={}&identity_start={}",
            URL_SCHEME, self.database, self.save_policy, self.identity_start
        );
        if let Some(path) = &self.snapshot_path {
            url.push_str(&format!("&snapshot={}", path.display()));
        }
        if self.durability == DurabilityMode::OnCommit {
            url.push_str("&durability=on_commit");
        }
        url
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(DbError::ConfigError("Database name cannot be empty".into()));
        }

        if self.durability == DurabilityMode::OnCommit && self.snapshot_path.is_none() {
            return Err(DbError::ConfigError(
                "durability 'on_commit' requires a snapshot path".into(),
            ));
        }

        // to_url writes these verbatim, so they must stay parseable by from_url
        if self.database.contains(URL_RESERVED) {
            return Err(DbError::ConfigError(format!(
                "Database name '{}' contains one of {:?}",
                self.database, URL_RESERVED
            )));
        }
        if let Some(path) = &self.snapshot_path {
            if path.to_string_lossy().contains(URL_RESERVED) {
                return Err(DbError::ConfigError(format!(
                    "Snapshot path '{}' contains one of {:?}",
                    path.display(),
                    URL_RESERVED
                )));
            }
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("reservadb")
    }
}
