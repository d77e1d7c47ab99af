use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use super::{ytdlp::YtDlp, RelatedTrack, ServiceKind, SourceKind, TrackSource};
use crate::error::{MusicError, MusicResult};

static YOUTUBE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/|playlist\?)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex de YouTube válida")
});

/// Número de pistas relacionadas que se guardan por vídeo.
const RELATED_LIMIT: usize = 5;

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    ytdlp: YtDlp,
}

impl YouTubeClient {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }

    /// Metadatos del vídeo más su lista de relacionados.
    pub async fn get_track(&self, url: &str) -> MusicResult<TrackSource> {
        let (info, related) = tokio::join!(self.ytdlp.dump_json(url), self.related_tracks(url));
        let info = info.map_err(MusicError::resolution)?;

        let track = info.into_track(ServiceKind::YouTube {
            is_live: false,
            related,
        });

        // Los directos no tienen relacionados útiles
        if track.is_live() {
            return Ok(TrackSource {
                service: ServiceKind::YouTube {
                    is_live: true,
                    related: Vec::new(),
                },
                ..track
            });
        }

        Ok(track)
    }

    /// Primer resultado de una búsqueda por palabras clave.
    pub async fn search(&self, query: &str) -> MusicResult<TrackSource> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::Resolution("búsqueda vacía".to_string()));
        }

        debug!("🔍 Buscando en YouTube: {}", query);
        let service = ServiceKind::bare(SourceKind::YouTube);
        let entries = self
            .ytdlp
            .flat_playlist(&Self::search_target(query, 1), 1, 1)
            .await
            .map_err(MusicError::resolution)?;

        entries
            .into_iter()
            .find_map(|entry| entry.into_track(service.clone()))
            .ok_or_else(|| MusicError::Resolution(format!("sin resultados para '{}'", query)))
    }

    /// Objetivo de yt-dlp para los `limit` primeros resultados.
    pub fn search_target(query: &str, limit: usize) -> String {
        format!("ytsearch{}:{}", limit.max(1), query.trim())
    }

    /// Relacionados a partir de la radio automática del vídeo; vacío si falla.
    async fn related_tracks(&self, url: &str) -> Vec<RelatedTrack> {
        let Some(video_id) = Self::extract_video_id(url) else {
            return Vec::new();
        };

        let service = ServiceKind::bare(SourceKind::YouTube);
        match self
            .ytdlp
            .flat_playlist(&Self::mix_url(&video_id), 2, RELATED_LIMIT + 1)
            .await
        {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|entry| {
                    let url = entry.page_url(&service)?;
                    Some(RelatedTrack {
                        url,
                        title: entry.title,
                        duration_seconds: entry.duration.map(|d| d.round() as u64).unwrap_or(0),
                    })
                })
                .collect(),
            Err(e) => {
                warn!("⚠️ No se pudieron obtener relacionados de {}: {}", url, e);
                Vec::new()
            }
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_REGEX.is_match(url)
    }

    /// Lista de reproducción finita (las radios `RD` son infinitas y van por el mix).
    pub fn is_playlist_url(url: &str) -> bool {
        if !Self::is_youtube_url(url) {
            return false;
        }

        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        parsed
            .query_pairs()
            .find(|(key, _)| key == "list")
            .map(|(_, list)| !list.starts_with("RD"))
            .unwrap_or(false)
    }

    /// Extrae el id de vídeo de las formas habituales de URL.
    pub fn extract_video_id(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;

        let id = if host.ends_with("youtu.be") {
            parsed.path_segments()?.next().map(str::to_string)
        } else if let Some((_, v)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            Some(v.into_owned())
        } else {
            let mut segments = parsed.path_segments()?;
            match segments.next() {
                Some("shorts") | Some("embed") | Some("v") => segments.next().map(str::to_string),
                _ => None,
            }
        };

        debug!("🆔 Video id de {}: {:?}", url, id);
        id.filter(|id| !id.is_empty())
    }

    /// Radio automática generada por YouTube para un vídeo.
    pub fn mix_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={0}&list=RD{0}", video_id)
    }
}
