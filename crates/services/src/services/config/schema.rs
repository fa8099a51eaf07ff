use std::{env, time::Duration};

use db::models::column::Column;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use super::ConfigError;

const DEFAULT_NOTIFICATION_TTL_MS: u64 = 3000;
const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_TERMINAL_COLUMN: &str = "col-3";

fn default_columns() -> Vec<Column> {
    vec![
        Column::new("col-1", "Pending"),
        Column::new("col-2", "In Progress"),
        Column::new("col-3", "Done"),
    ]
}

fn default_terminal_column() -> String {
    DEFAULT_TERMINAL_COLUMN.to_string()
}

fn default_notification_ttl_ms() -> u64 {
    DEFAULT_NOTIFICATION_TTL_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Board layout and store tuning. The column set is fixed for the lifetime
/// of a `BoardService`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_columns")]
    pub columns: Vec<Column>,
    /// Moving a task into this column from elsewhere is celebrated.
    #[serde(default = "default_terminal_column")]
    pub terminal_column: String,
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            terminal_column: default_terminal_column(),
            notification_ttl_ms: default_notification_ttl_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl BoardConfig {
    pub fn from_raw(raw_config: &str) -> Self {
        match serde_json::from_str::<BoardConfig>(raw_config) {
            Ok(config) => config.normalized(),
            Err(e) => {
                warn!(
                    "Failed to parse config (line {}, column {}): {}, using default",
                    e.line(),
                    e.column(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        if self.columns.is_empty() {
            warn!("Config has no columns, using the default board");
            self.columns = default_columns();
        }

        let mut seen = std::collections::HashSet::new();
        self.columns.retain(|column| {
            let fresh = seen.insert(column.id.clone());
            if !fresh {
                warn!("Duplicate column id '{}' ignored", column.id);
            }
            fresh
        });

        if self.column(&self.terminal_column).is_none() {
            let fallback = self
                .columns
                .last()
                .map(|column| column.id.clone())
                .unwrap_or_else(default_terminal_column);
            warn!(
                "Terminal column '{}' is not on the board, using '{}'",
                self.terminal_column, fallback
            );
            self.terminal_column = fallback;
        }

        if self.event_capacity == 0 {
            warn!("event_capacity must be positive, using default {DEFAULT_EVENT_CAPACITY}");
            self.event_capacity = DEFAULT_EVENT_CAPACITY;
        }

        self
    }

    /// Applies `KANBAN_*` overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| env::var(name).ok())
    }

    pub fn with_env_from<F>(mut self, get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.notification_ttl_ms = read_env_u64(
            "KANBAN_NOTIFICATION_TTL_MS",
            self.notification_ttl_ms,
            &get_env,
        );
        self.event_capacity =
            read_env_usize("KANBAN_EVENT_CAPACITY", self.event_capacity, &get_env);
        if let Some(terminal) = get_env("KANBAN_TERMINAL_COLUMN") {
            self.terminal_column = terminal.trim().to_string();
        }
        self.normalized()
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == column_id)
    }

    pub fn is_terminal(&self, column_id: &str) -> bool {
        self.terminal_column == column_id
    }
}

/// Where the hosted table/auth service lives.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub url: Url,
    pub api_key: String,
}

impl RemoteConfig {
    pub const URL_VAR: &'static str = "KANBAN_REMOTE_URL";
    pub const API_KEY_VAR: &'static str = "KANBAN_REMOTE_API_KEY";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| env::var(name).ok())
    }

    pub fn from_env_with<F>(get_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            get_env(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };

        let raw_url = read(Self::URL_VAR)?;
        let url = Url::parse(&raw_url)
            .map_err(|err| ConfigError::ValidationError(format!("{}: {err}", Self::URL_VAR)))?;
        let api_key = read(Self::API_KEY_VAR)?;
        Ok(Self { url, api_key })
    }
}

fn read_env_u64<F>(name: &str, default: u64, get_env: &F) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => match value.parse::<u64>() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Invalid {name}='{value}': {err}. Using default {default}.");
                default
            }
        },
        None => default,
    }
}

fn read_env_usize<F>(name: &str, default: usize, get_env: &F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => match value.parse::<usize>() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Invalid {name}='{value}': {err}. Using default {default}.");
                default
            }
        },
        None => default,
    }
}
