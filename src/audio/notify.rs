use async_trait::async_trait;
use std::time::Duration;

use super::queue::QueueEntry;

/// Datos de estado que el núcleo entrega a la capa de presentación.
///
/// El núcleo nunca dibuja nada; [`crate::ui::embeds`] los convierte en
/// mensajes de Discord.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Loading,
    TrackAdded {
        entry: QueueEntry,
        index: usize,
        /// `None` cuando no se puede estimar (directos o duración desconocida).
        eta: Option<Duration>,
        cancellable: bool,
    },
    AddFailed {
        reason: String,
    },
    PlaylistProgress {
        title: String,
        processed: usize,
        total: usize,
    },
    PlaylistFinished {
        title: String,
        added: usize,
        total: usize,
        cancelled: bool,
    },
    Preparing {
        title: String,
    },
    NowPlaying {
        entry: QueueEntry,
        next: Option<String>,
        remaining: usize,
    },
    PlaybackFailed {
        title: String,
        reason: String,
    },
    QueueEmpty,
}

/// Mensaje ya enviado que se puede editar.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusMessage: Send + Sync {
    async fn edit(&self, update: StatusUpdate) -> anyhow::Result<()>;
}

/// Envío de avisos al canal vinculado de un servidor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelNotifier: Send + Sync {
    async fn send(&self, channel_id: u64, update: StatusUpdate) -> anyhow::Result<()>;
}

/// Notificador que descarta todo; útil sin canal o en pruebas.
pub struct NullNotifier;

#[async_trait]
impl ChannelNotifier for NullNotifier {
    async fn send(&self, _channel_id: u64, _update: StatusUpdate) -> anyhow::Result<()> {
        Ok(())
    }
}
