use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

use crate::{error::MusicResult, sources::Playable};

/// Eventos terminales y de arranque de un stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start,
    Finish,
    Error(String),
}

/// Canal por el que un stream informa al reproductor.
///
/// Cada canal lleva la generación de su stream; los eventos tardíos de un
/// stream ya sustituido se reconocen y se ignoran.
#[derive(Debug, Clone)]
pub struct StreamEventSink {
    tx: mpsc::UnboundedSender<(u64, StreamEvent)>,
    generation: u64,
}

impl StreamEventSink {
    pub fn new(tx: mpsc::UnboundedSender<(u64, StreamEvent)>, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Devuelve `false` si el reproductor ya no existe.
    pub fn emit(&self, event: StreamEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Stream de audio activo.
#[async_trait]
pub trait AudioStream: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    /// Volumen lineal, de 0.0 a 2.0.
    fn set_volume(&self, volume: f32);
    fn destroy(&self);
    /// Posición reportada por el transporte.
    async fn position(&self) -> Option<Duration>;
}

/// Conexión de voz de un servidor.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn channel_id(&self) -> u64;

    async fn play(
        &self,
        playable: Playable,
        volume: f32,
        events: StreamEventSink,
    ) -> MusicResult<Box<dyn AudioStream>>;

    async fn disconnect(&self);
}

/// Fábrica de conexiones de voz.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, guild_id: u64, channel_id: u64) -> MusicResult<Arc<dyn VoiceConnection>>;
}
