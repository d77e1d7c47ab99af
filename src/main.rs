use anyhow::Result;
use serenity::{all::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod session;
mod sources;
mod storage;
mod ui;

use crate::audio::{queue::QueueLimits, voice::SongbirdConnector};
use crate::bot::{notifier::DiscordNotifier, MusicBot};
use crate::cache::MusicCache;
use crate::config::Config;
use crate::session::{SessionDeps, SessionRegistry};
use crate::sources::{mix::YouTubeMixSource, ytdlp::YtDlp, SourceResolver};
use crate::storage::BackupStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("simple_music_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Simple Music Bot v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let storage = Arc::new(BackupStorage::new(config.data_dir.clone()).await?);
    let cache = MusicCache::from_config(config.cache_size, config.cache_ttl);

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let deps = SessionDeps {
        resolver: Arc::new(SourceResolver::new(cache.clone())),
        mix_source: Arc::new(YouTubeMixSource::new(YtDlp::new(), &config.mix_region)),
        voice: Arc::new(SongbirdConnector::new(songbird.clone(), reqwest::Client::new())),
        notifier: Arc::new(DiscordNotifier::new(http)),
        limits: QueueLimits {
            max_size: config.max_queue_size,
            cancel_window: std::time::Duration::from_secs(config.cancel_last_add_window),
        },
        timings: config.playback_timings(),
        default_volume: config.default_volume,
    };
    let registry = Arc::new(SessionRegistry::new(deps));

    // Intents mínimos: comandos y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone(), registry.clone(), storage.clone(), cache);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful: guardar sesiones antes de salir
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, guardando sesiones...");
        storage.backup_all(&registry).await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
