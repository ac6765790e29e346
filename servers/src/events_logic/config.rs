use clap::Parser;
use lib_eventstream::EngineConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "server_events.conf";

#[derive(Parser, Deserialize, Debug, Clone, Default)]
#[clap(about = "Event stream SSE fan-out server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "EVENTS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "EVENTS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "EVENTS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NODE_ENV", help = "Runtime environment (development, production).")]
    pub node_env: Option<String>,

    #[clap(long, env = "NEWSCATCHER_API_KEY", hide_env_values = true, help = "Newscatcher API key. Sample data is served without it.")]
    pub api_key: Option<String>,

    #[clap(long, env = "NEWSCATCHER_BASE_URL", help = "Base URL of the Newscatcher Events API.")]
    pub base_url: Option<String>,

    #[clap(long, env = "POLLING_INTERVAL", help = "Polling interval in milliseconds.")]
    pub polling_interval: Option<u64>,

    #[clap(long, env = "MAX_EVENTS", help = "Maximum number of buffered events.")]
    pub max_events: Option<usize>,

    #[clap(long, env = "DAYS_BACK", help = "Look-back window of the fundraising search, in days.")]
    pub days_back: Option<u32>,

    /// Full engine tuning, only settable from the config file.
    #[clap(skip)]
    pub engine: Option<EngineConfig>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub environment: String,
    pub engine: EngineConfig,
}

impl Settings {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            node_env: other.node_env.or(self.node_env),
            api_key: other.api_key.or(self.api_key),
            base_url: other.base_url.or(self.base_url),
            polling_interval: other.polling_interval.or(self.polling_interval),
            max_events: other.max_events.or(self.max_events),
            days_back: other.days_back.or(self.days_back),
            engine: other.engine.or(self.engine),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(3001),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            node_env: Some("development".to_string()),
            ..Default::default()
        }
    }

    /// Folds the flat options into the engine configuration.
    fn resolve(self) -> Settings {
        let environment = self.node_env.unwrap_or_else(|| "development".to_string());
        let mut engine = self.engine.unwrap_or_default();

        if let Some(key) = self.api_key.filter(|k| !k.trim().is_empty()) {
            engine.api_key = Some(key);
        }
        if let Some(url) = self.base_url {
            engine.base_url = url;
        }
        if let Some(ms) = self.polling_interval {
            engine.polling_interval_ms = ms;
        }
        if let Some(max) = self.max_events {
            engine.max_events = max;
        }
        // Production keeps the search window small to bound upstream latency.
        match self.days_back {
            Some(days) => engine.days_back = days,
            None if environment == "production" => engine.days_back = 1,
            None => {}
        }

        Settings {
            port: self.port.unwrap_or(3001),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            environment,
            engine,
        }
    }
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }

    let Ok(config_str) = fs::read_to_string(path) else {
        log::warn!("Failed to read config file: {}. Falling back to other sources.", path.display());
        return None;
    };

    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!("Failed to parse config file: {} ({}). Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Loads the settings: defaults, then `server_events.conf` (or `--config-path`),
/// then environment variables and CLI arguments.
pub fn load_config() -> anyhow::Result<Settings> {
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config = current_config.merge(cli_args);

    let settings = current_config.resolve();
    settings.engine.validate()?;
    Ok(settings)
}
