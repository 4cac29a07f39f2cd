use anyhow::{bail, Context};
use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "grumble", about = "Anonymous grumble board backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API together with the archive scheduler (default)
    Serve,
    /// Run only the archive scheduler
    Cron,
    /// Archive expired grumbles once and exit
    PurgeExpired,
    /// Apply pending migrations and exit
    Migrate,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub purification: PurificationConfig,
    pub rankings: RankingsConfig,
    pub timeline: TimelineConfig,
    pub event: EventConfig,
    pub jobs: JobsConfig,
    pub moderation: ModerationConfig,
    pub stats: StatsConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Deadline for every HTTP request
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub header_name: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PurificationConfig {
    pub threshold_default: i64,
    pub threshold_min: i64,
    pub threshold_max: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RankingsConfig {
    pub limit_default: i64,
    pub limit_min: i64,
    pub limit_max: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TimelineConfig {
    pub page_size_default: i64,
    pub page_size_max: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EventConfig {
    /// IANA zone of the local day used for expiry and the morning archive window
    pub timezone: String,
    /// Used when `timezone` is empty or unknown
    pub utc_offset: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub purge_interval_secs: u64,
    pub purge_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StatsConfig {
    pub week_starts_on_sunday: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ModerationConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8081".to_string(),
            ],
            request_timeout_secs: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "grumble_uid".to_string(),
            header_name: "x-user-id".to_string(),
        }
    }
}

impl Default for PurificationConfig {
    fn default() -> Self {
        Self {
            threshold_default: 10,
            threshold_min: 1,
            threshold_max: 1000,
        }
    }
}

impl Default for RankingsConfig {
    fn default() -> Self {
        Self {
            limit_default: 10,
            limit_min: 1,
            limit_max: 100,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size_default: 20,
            page_size_max: 100,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Tokyo".to_string(),
            utc_offset: "+09:00".to_string(),
            start_hour: 0,
            end_hour: 12,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            purge_interval_secs: 300,
            purge_timeout_secs: 30,
        }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash-lite".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 10,
        }
    }
}

impl EventConfig {
    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        self.utc_offset
            .parse::<FixedOffset>()
            .map_err(|e| anyhow::anyhow!("invalid event.utc_offset {:?}: {}", self.utc_offset, e))
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        match config.database.path {
            None => config.database.path = Some(data_dir.join("grumble.db")),
            Some(ref p) if p.is_relative() => {
                config.database.path = Some(data_dir.join(p));
            }
            Some(_) => {}
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.purification;
        if !(p.threshold_min <= p.threshold_default && p.threshold_default <= p.threshold_max) {
            bail!(
                "purification thresholds must satisfy min <= default <= max (got {} / {} / {})",
                p.threshold_min,
                p.threshold_default,
                p.threshold_max
            );
        }
        if p.threshold_min < 1 {
            bail!("purification.threshold_min must be at least 1");
        }

        let r = &self.rankings;
        if !(r.limit_min <= r.limit_default && r.limit_default <= r.limit_max) || r.limit_min < 1 {
            bail!(
                "ranking limits must satisfy 1 <= min <= default <= max (got {} / {} / {})",
                r.limit_min,
                r.limit_default,
                r.limit_max
            );
        }

        let t = &self.timeline;
        if t.page_size_default < 1 || t.page_size_default > t.page_size_max {
            bail!("timeline.page_size_default must be between 1 and page_size_max");
        }

        let e = &self.event;
        if e.start_hour >= e.end_hour || e.end_hour > 24 {
            bail!(
                "event window must satisfy start_hour < end_hour <= 24 (got {}..{})",
                e.start_hour,
                e.end_hour
            );
        }
        e.offset()?;

        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be positive");
        }

        if self.jobs.purge_interval_secs == 0 || self.jobs.purge_timeout_secs == 0 {
            bail!("job interval and timeout must be positive");
        }

        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".grumble")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("grumble.db"))
    }
}
