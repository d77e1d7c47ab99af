//! # Sources Module
//!
//! Resolution of URLs and search queries to playable descriptors.
//!
//! The queue core never talks to a provider directly. It hands a
//! [`ResolveRequest`] to an [`AudioSourceResolver`] and receives a
//! [`TrackSource`] back, or a [`MusicError::Resolution`] failure.
//!
//! ## Providers
//!
//! - **YouTube**: metadata and related tracks through `yt-dlp`
//! - **SoundCloud**: metadata through `yt-dlp`
//! - **Custom**: direct audio-file links, checked with an HTTP `HEAD`
//! - **Unknown**: anything else, handed to `yt-dlp` as a generic extractor
//!
//! Input that is not an `http(s)` URL is treated as keywords and resolved to
//! the first YouTube search result (`ytsearch1:`).
//!
//! Resolved descriptors are kept in the shared [`MusicCache`].

pub mod direct_url;
pub mod mix;
pub mod soundcloud;
pub mod youtube;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    cache::MusicCache,
    error::{MusicError, MusicResult},
};

pub use direct_url::DirectUrlClient;
pub use mix::{MixItem, MixPlaylistSource, MixSession, YouTubeMixSource};
pub use soundcloud::SoundCloudClient;
pub use youtube::YouTubeClient;
pub use ytdlp::YtDlp;

/// Identificador de servicio, usado como pista al resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    YouTube,
    SoundCloud,
    Custom,
    Unknown,
}

impl SourceKind {
    /// Detecta el servicio a partir de la URL.
    pub fn detect(url: &str) -> Self {
        if YouTubeClient::is_youtube_url(url) {
            SourceKind::YouTube
        } else if SoundCloudClient::is_soundcloud_url(url) {
            SourceKind::SoundCloud
        } else if DirectUrlClient::is_audio_file_url(url) {
            SourceKind::Custom
        } else {
            SourceKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::SoundCloud => "soundcloud",
            SourceKind::Custom => "custom",
            SourceKind::Unknown => "unknown",
        }
    }
}

/// Pista sugerida por el proveedor para el autocompletado de relacionados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedTrack {
    pub url: String,
    pub title: Option<String>,
    #[serde(default)]
    pub duration_seconds: u64,
}

/// Campos específicos de cada servicio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "lowercase")]
pub enum ServiceKind {
    YouTube {
        #[serde(default)]
        is_live: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        related: Vec<RelatedTrack>,
    },
    SoundCloud,
    Custom,
    Unknown,
}

impl ServiceKind {
    pub fn kind(&self) -> SourceKind {
        match self {
            ServiceKind::YouTube { .. } => SourceKind::YouTube,
            ServiceKind::SoundCloud => SourceKind::SoundCloud,
            ServiceKind::Custom => SourceKind::Custom,
            ServiceKind::Unknown => SourceKind::Unknown,
        }
    }

    /// Servicio "vacío" para un tipo dado, sin datos específicos.
    pub fn bare(kind: SourceKind) -> Self {
        match kind {
            SourceKind::YouTube => ServiceKind::YouTube {
                is_live: false,
                related: Vec::new(),
            },
            SourceKind::SoundCloud => ServiceKind::SoundCloud,
            SourceKind::Custom => ServiceKind::Custom,
            SourceKind::Unknown => ServiceKind::Unknown,
        }
    }
}

/// Cómo obtener el audio de una pista en el momento de reproducirla.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playable {
    /// URL de audio servida tal cual por HTTP.
    Direct(String),
    /// Página que hay que pasar por yt-dlp.
    YtDlp(String),
}

/// Descriptor canónico de una pista resuelta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSource {
    pub title: String,
    pub url: String,
    /// `0` significa duración desconocida o directo.
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(flatten)]
    pub service: ServiceKind,
    /// Las fuentes privadas no cuentan en la duración ni en los listados públicos.
    #[serde(default)]
    pub private: bool,
}

impl TrackSource {
    pub fn new(title: impl Into<String>, url: impl Into<String>, service: ServiceKind) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration_seconds: 0,
            thumbnail: None,
            service,
            private: false,
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn set_private(&mut self, private: bool) {
        self.private = private;
    }

    pub fn kind(&self) -> SourceKind {
        self.service.kind()
    }

    pub fn is_live(&self) -> bool {
        matches!(self.service, ServiceKind::YouTube { is_live: true, .. })
    }

    /// Duración desconocida: directo o sin metadatos.
    pub fn has_unknown_length(&self) -> bool {
        self.duration_seconds == 0 || self.is_live()
    }

    pub fn related(&self) -> &[RelatedTrack] {
        match &self.service {
            ServiceKind::YouTube { related, .. } => related,
            _ => &[],
        }
    }

    /// Capacidad de obtener el audio real, invocada al reproducir.
    ///
    /// Las URLs de stream de yt-dlp caducan; se piden en cada reproducción.
    pub fn playable(&self) -> Playable {
        match self.service {
            ServiceKind::Custom => Playable::Direct(self.url.clone()),
            _ => Playable::YtDlp(self.url.clone()),
        }
    }
}

/// Petición de resolución para una URL.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub url: String,
    /// `None` detecta el servicio a partir de la URL.
    pub hint: Option<SourceKind>,
    /// Descriptor ya conocido (listas, importaciones, mix); evita la red.
    pub known: Option<TrackSource>,
    pub force_cache: bool,
    /// No leer ni escribir la caché.
    pub prevent_cache: bool,
}

impl ResolveRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Capacidad de resolver URLs a descriptores reproducibles.
#[async_trait]
pub trait AudioSourceResolver: Send + Sync {
    async fn resolve(&self, request: ResolveRequest) -> MusicResult<TrackSource>;

    /// Enumera una lista de reproducción, hasta `limit` elementos.
    async fn playlist_items(&self, url: &str, limit: usize) -> MusicResult<Vec<TrackSource>>;

    /// Indica si la URL apunta a una lista y no a una pista suelta.
    fn is_playlist_url(&self, url: &str) -> bool;

    /// Busca por palabras clave y devuelve el primer resultado.
    async fn search(&self, query: &str) -> MusicResult<TrackSource>;
}

/// `true` si la entrada es una URL http(s); el resto se trata como búsqueda.
pub fn is_url(input: &str) -> bool {
    url::Url::parse(input.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Resolver de producción sobre yt-dlp, HTTP y la caché de metadatos.
pub struct SourceResolver {
    cache: MusicCache,
    youtube: YouTubeClient,
    soundcloud: SoundCloudClient,
    direct: DirectUrlClient,
    ytdlp: YtDlp,
}

impl SourceResolver {
    pub fn new(cache: MusicCache) -> Self {
        let ytdlp = YtDlp::new();
        Self {
            cache,
            youtube: YouTubeClient::new(ytdlp.clone()),
            soundcloud: SoundCloudClient::new(ytdlp.clone()),
            direct: DirectUrlClient::new(),
            ytdlp,
        }
    }

    pub fn cache(&self) -> &MusicCache {
        &self.cache
    }

    async fn fetch(&self, url: &str, kind: SourceKind) -> MusicResult<TrackSource> {
        match kind {
            SourceKind::YouTube => self.youtube.get_track(url).await,
            SourceKind::SoundCloud => self.soundcloud.get_track(url).await,
            SourceKind::Custom => self.direct.get_track(url).await,
            SourceKind::Unknown => {
                let info = self.ytdlp.dump_json(url).await.map_err(MusicError::resolution)?;
                Ok(info.into_track(ServiceKind::Unknown))
            }
        }
    }
}

#[async_trait]
impl AudioSourceResolver for SourceResolver {
    async fn resolve(&self, request: ResolveRequest) -> MusicResult<TrackSource> {
        let kind = request.hint.unwrap_or_else(|| SourceKind::detect(&request.url));

        if let Some(mut known) = request.known {
            debug!("📎 Usando descriptor conocido para {}", request.url);
            if known.url.is_empty() {
                known.url = request.url;
            }
            return Ok(known);
        }

        if !request.prevent_cache {
            if let Some(cached) = self.cache.get(&request.url) {
                debug!("💾 Cache hit: {}", request.url);
                return Ok(cached);
            }
        }

        info!("🔎 Resolviendo {} ({})", request.url, kind.as_str());
        let track = self.fetch(&request.url, kind).await?;

        if request.force_cache && !request.prevent_cache {
            self.cache.insert(request.url.clone(), track.clone());
        }

        Ok(track)
    }

    async fn playlist_items(&self, url: &str, limit: usize) -> MusicResult<Vec<TrackSource>> {
        let service = ServiceKind::bare(SourceKind::detect(url));
        let entries = self
            .ytdlp
            .flat_playlist(url, 1, limit)
            .await
            .map_err(MusicError::resolution)?;

        info!("📋 Lista {} con {} elementos", url, entries.len());

        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.into_track(service.clone()))
            .collect())
    }

    fn is_playlist_url(&self, url: &str) -> bool {
        YouTubeClient::is_playlist_url(url) || SoundCloudClient::is_playlist_url(url)
    }

    async fn search(&self, query: &str) -> MusicResult<TrackSource> {
        let track = self.youtube.search(query).await?;
        info!("🔍 '{}' → {}", query.trim(), track.url);
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_service_from_url() {
        assert_eq!(SourceKind::detect("https://youtu.be/dQw4w9WgXcQ"), SourceKind::YouTube);
        assert_eq!(
            SourceKind::detect("https://soundcloud.com/artist/track"),
            SourceKind::SoundCloud
        );
        assert_eq!(SourceKind::detect("https://example.com/song.mp3"), SourceKind::Custom);
        assert_eq!(SourceKind::detect("https://example.com/watch"), SourceKind::Unknown);
    }

    #[test]
    fn only_direct_files_skip_ytdlp() {
        let track = TrackSource::new("a", "https://youtu.be/x", ServiceKind::bare(SourceKind::YouTube));
        assert_eq!(track.playable(), Playable::YtDlp("https://youtu.be/x".into()));

        // Una URL de stream antigua en la copia se ignora
        let restored: TrackSource = serde_json::from_value(serde_json::json!({
            "title": "a",
            "url": "https://youtu.be/x",
            "service": "youtube",
            "stream_url": "https://cdn.example.com/a.webm"
        }))
        .unwrap();
        assert_eq!(restored.playable(), Playable::YtDlp("https://youtu.be/x".into()));

        let custom = TrackSource::new("b", "https://example.com/b.mp3", ServiceKind::Custom);
        assert_eq!(custom.playable(), Playable::Direct("https://example.com/b.mp3".into()));
    }

    #[test]
    fn only_http_urls_skip_search() {
        assert!(is_url("https://youtu.be/x"));
        assert!(is_url(" http://example.com/a.mp3 "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/a.mp3"));
        assert!(!is_url("artista: canción"));
    }

    #[test]
    fn live_tracks_have_unknown_length() {
        let live = TrackSource::new(
            "radio",
            "https://youtu.be/live",
            ServiceKind::YouTube {
                is_live: true,
                related: vec![],
            },
        )
        .with_duration(120);
        assert!(live.has_unknown_length());
        assert!(TrackSource::new("c", "u", ServiceKind::Unknown).has_unknown_length());
    }

    #[tokio::test]
    async fn known_descriptor_skips_network_and_cache() {
        let resolver = SourceResolver::new(MusicCache::new(10));
        let known = TrackSource::new("Known", "", ServiceKind::SoundCloud).with_duration(42);
        let track = resolver
            .resolve(ResolveRequest {
                url: "https://soundcloud.com/a/b".into(),
                known: Some(known),
                force_cache: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(track.url, "https://soundcloud.com/a/b");
        assert_eq!(track.duration_seconds, 42);
        assert_eq!(resolver.cache().len(), 0);
    }

    #[tokio::test]
    async fn cached_descriptor_is_returned_unless_prevented() {
        let resolver = SourceResolver::new(MusicCache::new(10));
        let cached = TrackSource::new("Cached", "https://example.com/a.mp3", ServiceKind::Custom);
        resolver
            .cache()
            .insert("https://example.com/a.mp3".to_string(), cached.clone());

        let track = resolver
            .resolve(ResolveRequest::new("https://example.com/a.mp3"))
            .await
            .unwrap();
        assert_eq!(track, cached);
    }
}
