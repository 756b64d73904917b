use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub scheduler: SchedulerConfig,
    pub email: EmailConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    /// Base URL used when building links sent by email
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Without a URL the service keeps everything in memory
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub enabled: bool,
    pub queue_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Root directory for uploaded avatars, served under `/media`
    pub directory: PathBuf,
    pub max_avatar_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily-rotated log file; console only when unset
    pub directory: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
                public_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                enabled: false,
                queue_key: "todo:jobs".to_string(),
            },
            scheduler: SchedulerConfig { tick_seconds: 10 },
            email: EmailConfig {
                from_address: "noreply@localhost".to_string(),
            },
            media: MediaConfig {
                directory: PathBuf::from("media"),
                max_avatar_bytes: 2 * 1024 * 1024,
            },
            logging: LoggingConfig { directory: None },
        }
    }
}

fn var_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            server: ServerConfig {
                port: parse_or("PORT", defaults.server.port)?,
                host: var_or("HOST", defaults.server.host),
                cors_allowed_origins: match env::var("ALLOWED_ORIGINS") {
                    Ok(origins) => origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                    Err(_) => defaults.server.cors_allowed_origins,
                },
                public_url: var_or("PUBLIC_URL", defaults.server.public_url)
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
                max_connections: parse_or("DB_MAX_CONNECTIONS", defaults.database.max_connections)?,
                min_connections: parse_or("DB_MIN_CONNECTIONS", defaults.database.min_connections)?,
            },
            redis: RedisConfig {
                url: var_or("REDIS_URL", defaults.redis.url),
                enabled: parse_or("USE_JOB_QUEUE", defaults.redis.enabled)?,
                queue_key: var_or("JOB_QUEUE_KEY", defaults.redis.queue_key),
            },
            scheduler: SchedulerConfig {
                tick_seconds: parse_or("BEAT_TICK_SECONDS", defaults.scheduler.tick_seconds)?.max(1),
            },
            email: EmailConfig {
                from_address: var_or("EMAIL_FROM", defaults.email.from_address),
            },
            media: MediaConfig {
                directory: env::var("MEDIA_ROOT").map(PathBuf::from).unwrap_or(defaults.media.directory),
                max_avatar_bytes: parse_or("MAX_AVATAR_BYTES", defaults.media.max_avatar_bytes)?,
            },
            logging: LoggingConfig {
                directory: env::var("LOG_DIR").ok().map(PathBuf::from),
            },
        })
    }
}
