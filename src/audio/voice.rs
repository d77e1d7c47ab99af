//! Adaptadores de songbird para el transporte de voz.

use async_trait::async_trait;
use songbird::{
    input::{HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{num::NonZeroU64, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::stream::{AudioStream, StreamEvent, StreamEventSink, VoiceConnection, VoiceConnector};
use crate::{
    error::{MusicError, MusicResult},
    sources::Playable,
};

/// Conecta servidores a canales de voz mediante songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

fn non_zero(id: u64, what: &str) -> MusicResult<NonZeroU64> {
    NonZeroU64::new(id).ok_or_else(|| MusicError::Join(format!("{} inválido", what)))
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, guild_id: u64, channel_id: u64) -> MusicResult<Arc<dyn VoiceConnection>> {
        let guild = non_zero(guild_id, "servidor")?;
        let channel = non_zero(channel_id, "canal")?;

        let call = self
            .manager
            .join(guild, channel)
            .await
            .map_err(|e| MusicError::Join(e.to_string()))?;

        info!("🔗 Conectado al canal {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdConnection {
            manager: self.manager.clone(),
            http: self.http.clone(),
            call,
            guild,
            channel_id,
        }))
    }
}

struct SongbirdConnection {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    call: Arc<Mutex<Call>>,
    guild: NonZeroU64,
    channel_id: u64,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> u64 {
        self.channel_id
    }

    async fn play(
        &self,
        playable: Playable,
        volume: f32,
        events: StreamEventSink,
    ) -> MusicResult<Box<dyn AudioStream>> {
        let input: Input = match playable {
            Playable::Direct(url) => HttpRequest::new(self.http.clone(), url).into(),
            Playable::YtDlp(url) => YoutubeDl::new(self.http.clone(), url).into(),
        };

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        handle
            .set_volume(volume)
            .map_err(|e| MusicError::StreamFailure(e.to_string()))?;

        for (event, kind) in [
            (TrackEvent::Playable, ForwardKind::Start),
            (TrackEvent::End, ForwardKind::Finish),
            (TrackEvent::Error, ForwardKind::Error),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    ForwardEvent {
                        sink: events.clone(),
                        kind,
                    },
                )
                .map_err(|e| MusicError::StreamFailure(e.to_string()))?;
        }

        Ok(Box::new(SongbirdStream(handle)))
    }

    async fn disconnect(&self) {
        if let Err(e) = self.manager.remove(self.guild).await {
            warn!("⚠️ Error al salir del canal de voz: {}", e);
        }
    }
}

#[derive(Clone, Copy)]
enum ForwardKind {
    Start,
    Finish,
    Error,
}

/// Reenvía los eventos de songbird al reproductor.
struct ForwardEvent {
    sink: StreamEventSink,
    kind: ForwardKind,
}

#[async_trait]
impl VoiceEventHandler for ForwardEvent {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let event = match self.kind {
            ForwardKind::Start => StreamEvent::Start,
            ForwardKind::Finish => StreamEvent::Finish,
            ForwardKind::Error => {
                let reason = match ctx {
                    EventContext::Track(tracks) => tracks
                        .iter()
                        .find_map(|(state, _)| match &state.playing {
                            PlayMode::Errored(e) => Some(e.to_string()),
                            _ => None,
                        }),
                    _ => None,
                };
                StreamEvent::Error(reason.unwrap_or_else(|| "error de reproducción".to_string()))
            }
        };

        if !self.sink.emit(event) {
            debug!("Evento de stream sin reproductor");
        }

        // Un solo disparo por pista
        Some(Event::Cancel)
    }
}

struct SongbirdStream(TrackHandle);

#[async_trait]
impl AudioStream for SongbirdStream {
    fn pause(&self) {
        let _ = self.0.pause();
    }

    fn resume(&self) {
        let _ = self.0.play();
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.0.set_volume(volume);
    }

    fn destroy(&self) {
        let _ = self.0.stop();
    }

    async fn position(&self) -> Option<Duration> {
        self.0.get_info().await.ok().map(|info| info.position)
    }
}
