use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub finish_grace_ms: u64,
    pub fixed_finish_delay_ms: u64,

    // Caché
    pub cache_size: usize,
    pub cache_ttl: u64, // En segundos

    // Paths
    pub data_dir: PathBuf,

    // Copias de seguridad y UI
    pub backup_interval: u64,        // En segundos
    pub cancel_last_add_window: u64, // En segundos
    pub mix_region: String,
}

/// Constantes de tiempo que usa el reproductor al cerrar una pista.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTimings {
    /// Extra wait added on top of the estimated remaining duration.
    pub finish_grace: Duration,
    /// Flat wait for providers that report "finished" unreliably.
    pub fixed_finish_delay: Duration,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            finish_grace: Duration::from_millis(1500),
            fixed_finish_delay: Duration::from_millis(5000),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "999".to_string())
                .parse()?,
            finish_grace_ms: std::env::var("FINISH_GRACE_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()?,
            fixed_finish_delay_ms: std::env::var("FIXED_FINISH_DELAY_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,

            // Caché
            cache_size: std::env::var("CACHE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            cache_ttl: std::env::var("CACHE_TTL")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            backup_interval: std::env::var("BACKUP_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            cancel_last_add_window: std::env::var("CANCEL_LAST_ADD_WINDOW")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            mix_region: std::env::var("MIX_REGION").unwrap_or_else(|_| "JP".to_string()),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0 and 200
    /// - Queue and cache sizes must be greater than 0
    /// - The backup interval must be at least 10 seconds
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 200 {
            anyhow::bail!("Default volume must be between 0 and 200, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.backup_interval < 10 {
            anyhow::bail!("Backup interval too short, minimum 10s, got: {}", self.backup_interval);
        }

        Ok(())
    }

    pub fn playback_timings(&self) -> PlaybackTimings {
        PlaybackTimings {
            finish_grace: Duration::from_millis(self.finish_grace_ms),
            fixed_finish_delay: Duration::from_millis(self.fixed_finish_delay_ms),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} max queue, grace {}\n  \
            Cache: {} entries, ttl {}\n  \
            Backup: every {} in {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            humantime::format_duration(Duration::from_millis(self.finish_grace_ms)),
            self.cache_size,
            humantime::format_duration(Duration::from_secs(self.cache_ttl)),
            humantime::format_duration(Duration::from_secs(self.backup_interval)),
            self.data_dir.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto, deben proporcionarse)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 100,
            max_queue_size: 999,
            finish_grace_ms: 1500,
            fixed_finish_delay_ms: 5000,

            cache_size: 100,
            cache_ttl: 3600,

            data_dir: "./data".into(),

            backup_interval: 300,
            cancel_last_add_window: 300,
            mix_region: "JP".to_string(),
        }
    }
}
