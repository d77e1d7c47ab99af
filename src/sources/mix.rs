use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::{ytdlp::YtDlp, ServiceKind, SourceKind, TrackSource, YouTubeClient};
use crate::error::{MusicError, MusicResult};

/// Elementos que se piden a yt-dlp en cada tanda.
const MIX_BATCH: usize = 10;

/// Elemento devuelto por una sesión de mix.
#[derive(Debug, Clone, PartialEq)]
pub struct MixItem {
    pub url: Option<String>,
    pub title: Option<String>,
    pub duration_seconds: u64,
}

impl MixItem {
    /// Descriptor conocido para la cola; `None` si el elemento no tiene URL.
    pub fn into_track(self) -> Option<TrackSource> {
        let url = self.url?;
        let title = self.title.unwrap_or_else(|| url.clone());
        Some(
            TrackSource::new(title, url, ServiceKind::bare(SourceKind::YouTube))
                .with_duration(self.duration_seconds),
        )
    }
}

/// Cursor sobre una lista generada externamente.
#[async_trait]
pub trait MixSession: Send {
    /// Avanza un elemento. `Ok(None)` indica que la lista se agotó.
    async fn advance(&mut self) -> anyhow::Result<Option<MixItem>>;
}

/// Fuente de sesiones de mix.
#[async_trait]
pub trait MixPlaylistSource: Send + Sync {
    async fn start(&self, seed_url: &str) -> MusicResult<Box<dyn MixSession>>;
}

/// Radio automática de YouTube (`list=RD<id>`).
pub struct YouTubeMixSource {
    ytdlp: YtDlp,
}

impl YouTubeMixSource {
    pub fn new(ytdlp: YtDlp, region: &str) -> Self {
        Self {
            ytdlp: ytdlp.with_region(region),
        }
    }
}

#[async_trait]
impl MixPlaylistSource for YouTubeMixSource {
    async fn start(&self, seed_url: &str) -> MusicResult<Box<dyn MixSession>> {
        let video_id = YouTubeClient::extract_video_id(seed_url).ok_or_else(|| {
            MusicError::Resolution(format!("No es un vídeo de YouTube: {}", seed_url))
        })?;

        info!("🎛️ Iniciando mix para el vídeo {}", video_id);

        Ok(Box::new(YouTubeMixSession {
            ytdlp: self.ytdlp.clone(),
            list_url: YouTubeClient::mix_url(&video_id),
            // El primer elemento de la radio es la semilla
            next_index: 2,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }
}

struct YouTubeMixSession {
    ytdlp: YtDlp,
    list_url: String,
    next_index: usize,
    buffer: VecDeque<MixItem>,
    exhausted: bool,
}

impl YouTubeMixSession {
    async fn fill(&mut self) -> anyhow::Result<()> {
        let end = self.next_index + MIX_BATCH - 1;
        let entries = self.ytdlp.flat_playlist(&self.list_url, self.next_index, end).await?;

        debug!("🎛️ Mix: {} elementos nuevos desde {}", entries.len(), self.next_index);

        if entries.is_empty() {
            self.exhausted = true;
        }
        self.next_index = end + 1;

        let service = ServiceKind::bare(SourceKind::YouTube);
        self.buffer.extend(entries.into_iter().map(|entry| MixItem {
            url: entry.page_url(&service),
            title: entry.title,
            duration_seconds: entry.duration.map(|d| d.round() as u64).unwrap_or(0),
        }));

        Ok(())
    }
}

#[async_trait]
impl MixSession for YouTubeMixSession {
    async fn advance(&mut self) -> anyhow::Result<Option<MixItem>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }

        Ok(self.buffer.pop_front())
    }
}
