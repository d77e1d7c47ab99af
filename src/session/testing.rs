//! Dobles en memoria para las pruebas del núcleo.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::SessionDeps;
use crate::{
    audio::{
        notify::NullNotifier,
        queue::QueueLimits,
        stream::{AudioStream, StreamEvent, StreamEventSink, VoiceConnection, VoiceConnector},
    },
    config::PlaybackTimings,
    error::{MusicError, MusicResult},
    sources::{
        AudioSourceResolver, MixItem, MixPlaylistSource, MixSession, Playable, RelatedTrack,
        ResolveRequest, ServiceKind, SourceKind, TrackSource,
    },
};

/// Resolver falso: falla con cualquier URL de `broken.test`.
#[derive(Default)]
pub struct FakeResolver {
    duration: AtomicU64,
    related: Mutex<Vec<RelatedTrack>>,
    requests: Mutex<Vec<ResolveRequest>>,
    playlists: Mutex<HashMap<String, Vec<TrackSource>>>,
    listing_delay: Mutex<Duration>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duración que reciben las siguientes resoluciones.
    pub fn set_duration(&self, seconds: u64) {
        self.duration.store(seconds, Ordering::SeqCst);
    }

    pub fn set_related(&self, related: Vec<RelatedTrack>) {
        *self.related.lock() = related;
    }

    pub fn add_playlist(&self, url: &str, items: Vec<TrackSource>) {
        self.playlists.lock().insert(url.to_string(), items);
    }

    /// Tiempo que tarda en leer una lista.
    pub fn set_listing_delay(&self, delay: Duration) {
        *self.listing_delay.lock() = delay;
    }

    pub fn requests(&self) -> Vec<ResolveRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AudioSourceResolver for FakeResolver {
    async fn resolve(&self, request: ResolveRequest) -> MusicResult<TrackSource> {
        self.requests.lock().push(request.clone());

        if request.url.contains("broken.test") {
            return Err(MusicError::Resolution(format!("sin resultados: {}", request.url)));
        }

        if let Some(mut known) = request.known {
            if known.url.is_empty() {
                known.url = request.url;
            }
            return Ok(known);
        }

        let kind = request.hint.unwrap_or_else(|| SourceKind::detect(&request.url));
        let service = match kind {
            SourceKind::YouTube => ServiceKind::YouTube {
                is_live: false,
                related: self.related.lock().clone(),
            },
            other => ServiceKind::bare(other),
        };
        let title = request.url.rsplit('/').next().unwrap_or_default().to_string();

        Ok(TrackSource::new(title, request.url, service)
            .with_duration(self.duration.load(Ordering::SeqCst)))
    }

    async fn playlist_items(&self, url: &str, limit: usize) -> MusicResult<Vec<TrackSource>> {
        let delay = *self.listing_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.playlists
            .lock()
            .get(url)
            .map(|items| items.iter().take(limit).cloned().collect())
            .ok_or_else(|| MusicError::Resolution(format!("lista desconocida: {}", url)))
    }

    fn is_playlist_url(&self, url: &str) -> bool {
        self.playlists.lock().contains_key(url)
    }

    /// Devuelve un vídeo de YouTube con el texto buscado; "sin resultados" falla.
    async fn search(&self, query: &str) -> MusicResult<TrackSource> {
        if query.contains("sin resultados") {
            return Err(MusicError::Resolution(format!("sin resultados para '{}'", query)));
        }
        let id = query.trim().replace(' ', "-");
        Ok(TrackSource::new(
            query.trim(),
            format!("https://www.youtube.com/watch?v={}", id),
            ServiceKind::bare(SourceKind::YouTube),
        ))
    }
}

#[derive(Default)]
struct VoiceLog {
    played: Mutex<Vec<String>>,
    volumes: Mutex<Vec<f32>>,
    sinks: Mutex<Vec<StreamEventSink>>,
    joins: Mutex<Vec<u64>>,
    destroyed: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Transporte de voz falso: los streams de URLs con `broken-` fallan al abrirse.
#[derive(Clone, Default)]
pub struct FakeVoice {
    log: Arc<VoiceLog>,
}

impl FakeVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<String> {
        self.log.played.lock().clone()
    }

    /// Volúmenes de arranque y cambios posteriores, en orden.
    pub fn volumes(&self) -> Vec<f32> {
        self.log.volumes.lock().clone()
    }

    pub fn joins(&self) -> Vec<u64> {
        self.log.joins.lock().clone()
    }

    pub fn destroyed(&self) -> usize {
        self.log.destroyed.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.log.disconnects.load(Ordering::SeqCst)
    }

    pub fn last_sink(&self) -> Option<StreamEventSink> {
        self.log.sinks.lock().last().cloned()
    }

    /// Emite un evento en el último stream abierto.
    pub fn emit_last(&self, event: StreamEvent) {
        if let Some(sink) = self.last_sink() {
            sink.emit(event);
        }
    }
}

#[async_trait]
impl VoiceConnector for FakeVoice {
    async fn connect(&self, _guild_id: u64, channel_id: u64) -> MusicResult<Arc<dyn VoiceConnection>> {
        if channel_id == 0 {
            return Err(MusicError::Join("canal inválido".into()));
        }
        self.log.joins.lock().push(channel_id);
        Ok(Arc::new(FakeConnection {
            channel_id,
            log: self.log.clone(),
        }))
    }
}

struct FakeConnection {
    channel_id: u64,
    log: Arc<VoiceLog>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> u64 {
        self.channel_id
    }

    async fn play(
        &self,
        playable: Playable,
        volume: f32,
        events: StreamEventSink,
    ) -> MusicResult<Box<dyn AudioStream>> {
        let url = match playable {
            Playable::Direct(url) | Playable::YtDlp(url) => url,
        };
        if url.contains("broken-") {
            return Err(MusicError::StreamFailure(format!("no se pudo abrir {}", url)));
        }

        self.log.played.lock().push(url);
        self.log.volumes.lock().push(volume);
        self.log.sinks.lock().push(events);

        Ok(Box::new(FakeStream {
            log: self.log.clone(),
        }))
    }

    async fn disconnect(&self) {
        self.log.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeStream {
    log: Arc<VoiceLog>,
}

#[async_trait]
impl AudioStream for FakeStream {
    fn pause(&self) {}

    fn resume(&self) {}

    fn set_volume(&self, volume: f32) {
        self.log.volumes.lock().push(volume);
    }

    fn destroy(&self) {
        self.log.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn position(&self) -> Option<Duration> {
        None
    }
}

/// Fuente de mix con elementos fijos; `None` es un elemento sin URL.
pub struct FakeMix {
    items: Vec<Option<String>>,
}

impl FakeMix {
    pub fn new(items: Vec<Option<&str>>) -> Self {
        Self {
            items: items.into_iter().map(|i| i.map(str::to_string)).collect(),
        }
    }
}

#[async_trait]
impl MixPlaylistSource for FakeMix {
    async fn start(&self, seed_url: &str) -> MusicResult<Box<dyn MixSession>> {
        if seed_url.contains("broken.test") {
            return Err(MusicError::Resolution("semilla inválida".into()));
        }
        Ok(Box::new(FakeMixSession {
            items: self
                .items
                .iter()
                .map(|url| MixItem {
                    url: url.clone(),
                    title: None,
                    duration_seconds: 180,
                })
                .collect(),
        }))
    }
}

struct FakeMixSession {
    items: VecDeque<MixItem>,
}

#[async_trait]
impl MixSession for FakeMixSession {
    async fn advance(&mut self) -> anyhow::Result<Option<MixItem>> {
        Ok(self.items.pop_front())
    }
}

/// Espera (en tiempo de tokio) hasta que se cumpla la condición.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..3000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("la condición no se cumplió a tiempo");
}

/// Deja correr las tareas pendientes sin avanzar el reloj.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Dependencias de sesión con dobles; el mix ofrece dos elementos.
pub fn session_deps(resolver: Arc<FakeResolver>, voice: FakeVoice) -> SessionDeps {
    SessionDeps {
        resolver,
        mix_source: Arc::new(FakeMix::new(vec![
            Some("https://www.youtube.com/watch?v=m1"),
            Some("https://www.youtube.com/watch?v=m2"),
        ])),
        voice: Arc::new(voice),
        notifier: Arc::new(NullNotifier),
        limits: QueueLimits::default(),
        timings: PlaybackTimings::default(),
        default_volume: 100,
    }
}
