//! # Session Module
//!
//! Per-guild composition: one queue, one player and their dependencies.
//!
//! A [`GuildSession`] is created lazily by the [`SessionRegistry`] the first
//! time a guild interacts with the bot. Command handlers only ever talk to
//! the session; the session delegates queue mutations to its
//! [`QueueManager`] and playback transitions to its [`PlaybackManager`].
//!
//! Sessions can be exported to a compact status string plus a versioned
//! queue document and restored from them after a restart.

pub mod registry;
#[cfg(test)]
pub mod testing;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    audio::{
        cancellation::{CancellationSet, TaskCancellation},
        notify::{ChannelNotifier, StatusMessage, StatusUpdate},
        player::PlaybackManager,
        queue::{
            AddOptions, AddedBy, AddedTrack, InsertMode, PlaylistOutcome, PlaylistRequest,
            PlaylistResult, QueueLimits, QueueManager,
        },
        state::{GuildSettings, PlaybackStatus, PlayerState},
        stream::VoiceConnector,
    },
    config::PlaybackTimings,
    error::{MusicError, MusicResult},
    sources::{self, AudioSourceResolver, MixPlaylistSource, SourceKind, TrackSource},
};

pub use registry::SessionRegistry;

/// Versión actual del documento de cola.
pub const QUEUE_DOCUMENT_VERSION: u32 = 1;

/// Dependencias compartidas por todas las sesiones.
#[derive(Clone)]
pub struct SessionDeps {
    pub resolver: Arc<dyn AudioSourceResolver>,
    pub mix_source: Arc<dyn MixPlaylistSource>,
    pub voice: Arc<dyn VoiceConnector>,
    pub notifier: Arc<dyn ChannelNotifier>,
    pub limits: QueueLimits,
    pub timings: PlaybackTimings,
    pub default_volume: u8,
}

/// Estado persistible de un servidor.
///
/// Se codifica como `voice:bound:loop:queueLoop:related[:equal]`, con banderas `1`/`0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildStatus {
    /// `0` si no estaba reproduciendo.
    pub voice_channel: u64,
    pub bound_channel: u64,
    pub loop_enabled: bool,
    pub queue_loop_enabled: bool,
    pub add_related: bool,
    pub equal_playback: bool,
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl GuildStatus {
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.voice_channel,
            self.bound_channel,
            flag(self.loop_enabled),
            flag(self.queue_loop_enabled),
            flag(self.add_related),
            flag(self.equal_playback),
        )
    }
}

/// Interpreta una cadena de estado exportada.
pub fn parse_status(raw: &str) -> MusicResult<GuildStatus> {
    let invalid = || MusicError::InvalidOperation(format!("Estado inválido: {}", raw));
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if !(5..=6).contains(&parts.len()) {
        return Err(invalid());
    }

    let parse_flag = |part: &str| match part {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(invalid()),
    };

    Ok(GuildStatus {
        voice_channel: parts[0].parse().map_err(|_| invalid())?,
        bound_channel: parts[1].parse().map_err(|_| invalid())?,
        loop_enabled: parse_flag(parts[2])?,
        queue_loop_enabled: parse_flag(parts[3])?,
        add_related: parse_flag(parts[4])?,
        equal_playback: parts.get(5).map(|p| parse_flag(p)).transpose()?.unwrap_or(false),
    })
}

/// Elemento exportado de la cola.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEntry {
    pub track: TrackSource,
    pub added_by: AddedBy,
}

/// Documento versionado con el contenido de la cola.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    pub version: u32,
    pub data: Vec<ExportedEntry>,
}

/// Parámetros de una petición de reproducción.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// URL o palabras clave de búsqueda.
    pub url: String,
    pub added_by: AddedBy,
    /// Insertar delante en vez de al final.
    pub first: bool,
    /// Ofrecer el botón de cancelar el añadido.
    pub cancellable: bool,
    /// Fuente privada: sin caché ni exportación.
    pub private: bool,
}

#[derive(Debug)]
pub enum PlayOutcome {
    Track(AddedTrack),
    Playlist(PlaylistResult),
    Failed,
}

/// Sesión de un servidor.
pub struct GuildSession {
    guild_id: u64,
    queue: Arc<QueueManager>,
    player: Arc<PlaybackManager>,
    settings: Arc<GuildSettings>,
    status: Arc<PlaybackStatus>,
    cancellations: Arc<CancellationSet>,
    resolver: Arc<dyn AudioSourceResolver>,
    voice: Arc<dyn VoiceConnector>,
    join_lock: Mutex<()>,
    max_queue_size: usize,
}

impl GuildSession {
    pub fn new(guild_id: u64, bound_channel: u64, deps: &SessionDeps) -> Arc<Self> {
        let settings = Arc::new(GuildSettings::new(bound_channel));
        let status = Arc::new(PlaybackStatus::new());
        let queue = Arc::new(QueueManager::new(
            guild_id,
            deps.limits,
            deps.resolver.clone(),
            deps.mix_source.clone(),
            settings.clone(),
            status.clone(),
        ));
        let player = PlaybackManager::new(
            guild_id,
            queue.clone(),
            status.clone(),
            settings.clone(),
            deps.notifier.clone(),
            deps.timings,
            deps.default_volume,
        );

        info!("🆕 Sesión creada para guild {}", guild_id);

        Arc::new(Self {
            guild_id,
            queue,
            player,
            settings,
            status,
            cancellations: CancellationSet::new(),
            resolver: deps.resolver.clone(),
            voice: deps.voice.clone(),
            join_lock: Mutex::new(()),
            max_queue_size: deps.limits.max_size,
        })
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn player(&self) -> &Arc<PlaybackManager> {
        &self.player
    }

    pub fn settings(&self) -> &Arc<GuildSettings> {
        &self.settings
    }

    pub fn cancellations(&self) -> &Arc<CancellationSet> {
        &self.cancellations
    }

    /// Une el bot al canal de voz. Un solo intento a la vez por servidor.
    pub async fn join(&self, channel_id: u64) -> MusicResult<()> {
        let _guard = self.join_lock.lock().await;
        if self.player.channel_id() == Some(channel_id) {
            return Ok(());
        }

        info!("🔊 Uniéndose al canal {} en guild {}", channel_id, self.guild_id);
        let connection = self.voice.connect(self.guild_id, channel_id).await?;
        self.player.set_connection(connection);
        Ok(())
    }

    pub async fn leave(&self) {
        self.cancellations.cancel_all();
        self.player.disconnect().await;
    }

    /// Añade una URL (pista o lista) y empieza a reproducir si estaba parado.
    pub async fn play_from_url(
        &self,
        mut request: PlayRequest,
        status: Option<&dyn StatusMessage>,
    ) -> PlayOutcome {
        let mode = if request.first {
            InsertMode::Prepend
        } else {
            InsertMode::Append
        };

        // Lo que no es una URL se busca y se usa el primer resultado
        let found = if sources::is_url(&request.url) {
            None
        } else {
            match self.search(&request.url, status).await {
                Some(track) => {
                    request.url = track.url.clone();
                    Some(track)
                }
                None => {
                    self.ensure_playing().await;
                    return PlayOutcome::Failed;
                }
            }
        };

        let outcome = if self.resolver.is_playlist_url(&request.url) {
            match self.import_playlist(&request, mode, status).await {
                Some(result) => PlayOutcome::Playlist(result),
                None => PlayOutcome::Failed,
            }
        } else {
            let mut options = AddOptions::new(request.url.clone())
                .added_by(Some(request.added_by.clone()))
                .mode(mode)
                .private(request.private);
            if let Some(track) = found {
                options = options.known(track);
            }
            match self
                .queue
                .add_queue(options, request.cancellable, self.player.current_time(), status)
                .await
            {
                Some(added) => PlayOutcome::Track(added),
                None => PlayOutcome::Failed,
            }
        };

        self.ensure_playing().await;
        outcome
    }

    async fn search(&self, query: &str, status: Option<&dyn StatusMessage>) -> Option<TrackSource> {
        match self.resolver.search(query).await {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("⚠️ Búsqueda '{}' sin resultado en guild {}: {}", query, self.guild_id, e);
                if let Some(message) = status {
                    let update = StatusUpdate::AddFailed {
                        reason: e.to_string(),
                    };
                    if let Err(e) = message.edit(update).await {
                        warn!("⚠️ No se pudo editar el mensaje de estado: {}", e);
                    }
                }
                None
            }
        }
    }

    async fn import_playlist(
        &self,
        request: &PlayRequest,
        mode: InsertMode,
        status: Option<&dyn StatusMessage>,
    ) -> Option<PlaylistResult> {
        let token = TaskCancellation::new();
        let _binding = self.cancellations.bind(&token);

        // Leer la lista es una sola llamada; se abandona si cancelan mientras tanto
        let limit = self.max_queue_size.saturating_sub(self.queue.len());
        let listed = tokio::select! {
            listed = self.resolver.playlist_items(&request.url, limit) => listed,
            _ = token.cancelled() => {
                info!("🛑 Lectura de la lista {} cancelada", request.url);
                return Some(PlaylistResult {
                    added: Vec::new(),
                    attempted: 0,
                    outcome: PlaylistOutcome::Cancelled,
                });
            }
        };
        let items = match listed {
            Ok(items) => items,
            Err(e) => {
                warn!("⚠️ No se pudo leer la lista {}: {}", request.url, e);
                if let Some(message) = status {
                    let _ = message
                        .edit(StatusUpdate::AddFailed {
                            reason: e.to_string(),
                        })
                        .await;
                }
                return None;
            }
        };

        let total = items.len();
        let playlist = PlaylistRequest {
            title: request.url.clone(),
            added_by: Some(request.added_by.clone()),
            mode,
            hint: SourceKind::detect(&request.url),
        };

        let result = self
            .queue
            .process_playlist(&token, playlist, items, |track| async move { Ok(track) }, status)
            .await;

        info!(
            "📋 Lista importada en guild {}: {}/{} ({:?})",
            self.guild_id,
            result.added.len(),
            total,
            result.outcome
        );

        if let Some(message) = status {
            let update = StatusUpdate::PlaylistFinished {
                title: request.url.clone(),
                added: result.added.len(),
                total,
                cancelled: result.outcome == PlaylistOutcome::Cancelled,
            };
            if let Err(e) = message.edit(update).await {
                warn!("⚠️ No se pudo editar el mensaje de estado: {}", e);
            }
        }

        Some(result)
    }

    async fn ensure_playing(&self) {
        if self.status.get() == PlayerState::Idle && self.player.is_connected() {
            self.player.play().await;
        }
    }

    /// Salta la pista actual.
    pub async fn skip(&self) {
        info!("⏭️ Skip en guild {}", self.guild_id);
        self.player.stop();
        self.queue.next().await;
        if self.queue.mix_playlist_enabled() {
            if let Err(e) = self.queue.prepare_next_mix_item().await {
                warn!("⚠️ No se pudo preparar el siguiente elemento del mix: {}", e);
            }
        }
        self.player.play().await;
    }

    /// Cancela todas las operaciones en lote en curso.
    pub fn cancel_all(&self) -> bool {
        let cancelled = self.cancellations.cancel_all();
        info!("🛑 Cancelación en guild {}: {}", self.guild_id, cancelled);
        cancelled
    }

    /// Activa el mix a partir de la pista actual o de `url`.
    pub async fn start_mix(&self, url: Option<&str>, requester: AddedBy) -> MusicResult<()> {
        match url {
            Some(url) => {
                self.queue
                    .enable_mix_playlist(url, Some(requester), false)
                    .await?
            }
            None => {
                let head = self.queue.get(0).ok_or_else(|| {
                    MusicError::InvalidOperation("No hay ninguna pista en la cola".into())
                })?;
                self.queue
                    .enable_mix_playlist(head.url(), Some(requester), true)
                    .await?
            }
        }
        self.ensure_playing().await;
        Ok(())
    }

    // ---- exportar / importar ----

    pub fn status_snapshot(&self) -> GuildStatus {
        let voice_channel = if self.status.get() == PlayerState::Playing {
            self.player.channel_id().unwrap_or(0)
        } else {
            0
        };

        GuildStatus {
            voice_channel,
            bound_channel: self.settings.bound_channel().unwrap_or(0),
            loop_enabled: self.queue.loop_enabled(),
            queue_loop_enabled: self.queue.queue_loop_enabled(),
            add_related: self.settings.add_related(),
            equal_playback: self.settings.equal_playback(),
        }
    }

    pub fn export_status(&self) -> String {
        self.status_snapshot().encode()
    }

    /// Aplica un estado exportado; si estaba reproduciendo, vuelve al canal.
    pub async fn import_status(&self, status: &GuildStatus) -> MusicResult<()> {
        self.queue.set_loop_enabled(status.loop_enabled);
        self.queue.set_queue_loop_enabled(status.queue_loop_enabled);
        self.settings.set_add_related(status.add_related);
        self.settings.set_equal_playback(status.equal_playback);
        if status.bound_channel != 0 {
            self.settings.set_bound_channel(status.bound_channel);
        }

        if status.voice_channel != 0 {
            self.join(status.voice_channel).await?;
            self.player.play().await;
        }
        Ok(())
    }

    /// Exporta la cola, sin fuentes privadas.
    pub fn export_queue(&self) -> QueueDocument {
        QueueDocument {
            version: QUEUE_DOCUMENT_VERSION,
            data: self
                .queue
                .snapshot()
                .into_iter()
                .filter(|e| !e.basic_info.private)
                .map(|e| ExportedEntry {
                    track: (*e.basic_info).clone(),
                    added_by: e.added_by,
                })
                .collect(),
        }
    }

    /// Importa un documento de cola. Devuelve cuántas pistas se añadieron.
    pub async fn import_queue(&self, document: QueueDocument) -> MusicResult<usize> {
        if document.version != QUEUE_DOCUMENT_VERSION {
            return Err(MusicError::UnsupportedBackupVersion {
                expected: QUEUE_DOCUMENT_VERSION,
                found: document.version,
            });
        }

        let mut imported = 0;
        for item in document.data {
            let options = AddOptions::new(item.track.url.clone())
                .added_by(Some(item.added_by))
                .known(item.track);
            match self.queue.add_queue_only(options).await {
                Ok(_) => imported += 1,
                Err(e) => warn!("⚠️ Elemento de la copia omitido: {}", e),
            }
        }

        info!("📥 {} pistas restauradas en guild {}", imported, self.guild_id);
        Ok(imported)
    }
}
