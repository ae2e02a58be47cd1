use serde::{Deserialize, Serialize};
use theday_core::UnknownKindPolicy;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,

    /// Connection string for the tree store
    pub database_url: String,

    /// Folder created on first connection so top-level items have a parent
    #[serde(default)]
    pub root_folder_id: Option<String>,

    /// How batch entries with an unrecognized `Type` are handled
    #[serde(default)]
    pub unknown_mutations: UnknownKindPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "sqlite:theday.db?mode=rwc".to_string(),
            root_folder_id: None,
            unknown_mutations: UnknownKindPolicy::Reject,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the config from a variable lookup, falling back to defaults
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: var("THEDAY_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database_url: var("THEDAY_DATABASE_URL").unwrap_or(defaults.database_url),
            root_folder_id: var("THEDAY_ROOT_FOLDER").filter(|v| !v.is_empty()),
            unknown_mutations: var("THEDAY_UNKNOWN_MUTATIONS")
                .and_then(|v| match v.parse() {
                    Ok(policy) => Some(policy),
                    Err(e) => {
                        tracing::warn!("{e}, falling back to '{}'", defaults.unknown_mutations);
                        None
                    }
                })
                .unwrap_or(defaults.unknown_mutations),
        }
    }
}
