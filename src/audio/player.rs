use parking_lot::Mutex;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, error, info, warn};

use super::{
    notify::{ChannelNotifier, StatusUpdate},
    queue::{QueueEntry, QueueManager},
    state::{GuildSettings, PlaybackStatus, PlayerState},
    stream::{AudioStream, StreamEvent, StreamEventSink, VoiceConnection},
};
use crate::{
    config::PlaybackTimings,
    error::{MusicError, MusicResult},
    sources::SourceKind,
};

/// Espera antes de dar por terminada una pista.
///
/// Algunas fuentes avisan del final antes de vaciar el audio: se espera
/// hasta el final estimado más un margen de gracia.
pub fn finish_delay(
    kind: SourceKind,
    duration_seconds: u64,
    elapsed: Duration,
    timings: &PlaybackTimings,
) -> Duration {
    // Los enlaces directos no informan duración fiable
    if kind == SourceKind::Custom {
        return timings.fixed_finish_delay;
    }

    let length = Duration::from_secs(duration_seconds);
    if length > elapsed {
        length - elapsed + timings.finish_grace
    } else {
        Duration::ZERO
    }
}

fn linear_volume(percent: u8) -> f32 {
    (percent as f32 / 100.0).clamp(0.0, 2.0)
}

#[derive(Default)]
struct PlayerInner {
    connection: Option<Arc<dyn VoiceConnection>>,
    stream: Option<Arc<dyn AudioStream>>,
    current: Option<QueueEntry>,
    // Se incrementa con cada stream; los eventos de otra generación se ignoran
    generation: u64,
    start_time: Option<Instant>,
    paused_since: Option<Instant>,
    // El transporte ya avisó de que el audio empezó a sonar
    stream_started: bool,
    volume: u8,
    finish_task: Option<JoinHandle<()>>,
}

/// Reproductor de un servidor: un único stream activo.
pub struct PlaybackManager {
    guild_id: u64,
    queue: Arc<QueueManager>,
    status: Arc<PlaybackStatus>,
    settings: Arc<GuildSettings>,
    notifier: Arc<dyn ChannelNotifier>,
    timings: PlaybackTimings,
    inner: Mutex<PlayerInner>,
    events_tx: mpsc::UnboundedSender<(u64, StreamEvent)>,
}

impl PlaybackManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guild_id: u64,
        queue: Arc<QueueManager>,
        status: Arc<PlaybackStatus>,
        settings: Arc<GuildSettings>,
        notifier: Arc<dyn ChannelNotifier>,
        timings: PlaybackTimings,
        volume: u8,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            guild_id,
            queue,
            status,
            settings,
            notifier,
            timings,
            inner: Mutex::new(PlayerInner {
                volume,
                ..Default::default()
            }),
            events_tx,
        });

        tokio::spawn(Self::event_loop(Arc::downgrade(&manager), events_rx));
        manager
    }

    async fn event_loop(manager: Weak<Self>, mut events: mpsc::UnboundedReceiver<(u64, StreamEvent)>) {
        while let Some((generation, event)) = events.recv().await {
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.handle_stream_event(generation, event).await;
        }
        debug!("🔚 Bucle de eventos del reproductor terminado");
    }

    // ---- conexión ----

    pub fn set_connection(&self, connection: Arc<dyn VoiceConnection>) {
        info!(
            "🔗 Guild {} conectado al canal {}",
            self.guild_id,
            connection.channel_id()
        );
        self.inner.lock().connection = Some(connection);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    pub fn channel_id(&self) -> Option<u64> {
        self.inner.lock().connection.as_ref().map(|c| c.channel_id())
    }

    fn connection(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.inner.lock().connection.clone()
    }

    // ---- estado ----

    pub fn state(&self) -> PlayerState {
        self.status.get()
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.status.is_paused()
    }

    pub fn current(&self) -> Option<QueueEntry> {
        self.inner.lock().current.clone()
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().volume
    }

    /// Tiempo reproducido de la pista actual, descontando pausas.
    pub fn current_time(&self) -> Duration {
        let inner = self.inner.lock();
        match inner.start_time {
            Some(start) => inner
                .paused_since
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    /// Posición según el transporte, si la informa.
    pub async fn stream_position(&self) -> Option<Duration> {
        let stream = self.inner.lock().stream.clone()?;
        stream.position().await
    }

    // ---- reproducción ----

    /// Reproduce la cabeza de la cola; salta las pistas que fallen.
    pub async fn play(self: &Arc<Self>) {
        loop {
            let Some(connection) = self.connection() else {
                warn!("⚠️ Play() en guild {} sin conexión de voz, nada que hacer", self.guild_id);
                return;
            };
            if self.queue.is_empty() {
                warn!("⚠️ Play() en guild {} con la cola vacía, nada que hacer", self.guild_id);
                return;
            }
            if !self.status.transition(PlayerState::Idle, PlayerState::Preparing) {
                warn!(
                    "⚠️ Play() en guild {} ignorado: estado {:?}",
                    self.guild_id,
                    self.status.get()
                );
                return;
            }

            let Some(entry) = self.queue.get(0) else {
                self.status.set(PlayerState::Idle);
                return;
            };

            info!("▶️ Play() llamado en guild {}: {}", self.guild_id, entry.title());
            self.notify(StatusUpdate::Preparing {
                title: entry.title().to_string(),
            })
            .await;

            match self.start_stream(&connection, &entry).await {
                Ok(true) => {
                    info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, entry.title());
                    self.notify(self.now_playing(entry)).await;
                    return;
                }
                Ok(false) => {
                    debug!("Reproducción abortada en guild {} durante la preparación", self.guild_id);
                    return;
                }
                Err(e) => {
                    error!("❌ Play() falló en guild {}: {}", self.guild_id, e);
                    self.notify(StatusUpdate::PlaybackFailed {
                        title: entry.title().to_string(),
                        reason: e.to_string(),
                    })
                    .await;

                    if !self.skip_failed(&e).await {
                        return;
                    }
                }
            }
        }
    }

    /// Pide el stream al transporte. `Ok(false)` si se detuvo mientras tanto.
    async fn start_stream(
        &self,
        connection: &Arc<dyn VoiceConnection>,
        entry: &QueueEntry,
    ) -> MusicResult<bool> {
        let (generation, volume) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.paused_since = None;
            inner.stream_started = false;
            (inner.generation, inner.volume)
        };

        let sink = StreamEventSink::new(self.events_tx.clone(), generation);
        let stream: Arc<dyn AudioStream> = connection
            .play(entry.basic_info.playable(), linear_volume(volume), sink)
            .await?
            .into();

        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.connection.is_none() {
            drop(inner);
            stream.destroy();
            return Ok(false);
        }

        inner.stream = Some(stream);
        inner.current = Some(entry.clone());
        inner.start_time = Some(Instant::now());
        drop(inner);

        self.status.set(PlayerState::Playing);
        Ok(true)
    }

    fn now_playing(&self, entry: QueueEntry) -> StatusUpdate {
        let snapshot = self.queue.snapshot();
        let looping = self.queue.loop_enabled();

        let next = if looping {
            Some(entry.title().to_string())
        } else if let Some(second) = snapshot.get(1) {
            Some(second.title().to_string())
        } else if self.queue.queue_loop_enabled() {
            Some(entry.title().to_string())
        } else {
            None
        };

        StatusUpdate::NowPlaying {
            entry,
            next,
            remaining: snapshot.len().saturating_sub(1),
        }
    }

    /// Tras un fallo: desactiva bucles degenerados y avanza.
    ///
    /// Devuelve `false` si la cola se vació y se desconectó.
    async fn skip_failed(&self, error: &MusicError) -> bool {
        warn!("⏭️ Saltando pista fallida en guild {}", self.guild_id);

        if self.queue.loop_enabled() {
            self.queue.set_loop_enabled(false);
        }
        if self.queue.len() == 1 && self.queue.queue_loop_enabled() {
            self.queue.set_queue_loop_enabled(false);
        }

        self.stop();
        self.queue.next().await;
        self.status.record_error(error.to_string());
        self.continue_mix().await;

        if self.queue.is_empty() {
            self.finish_queue().await;
            return false;
        }
        true
    }

    async fn continue_mix(&self) {
        if self.queue.mix_playlist_enabled() {
            if let Err(e) = self.queue.prepare_next_mix_item().await {
                warn!("⚠️ No se pudo preparar el siguiente elemento del mix: {}", e);
            }
        }
    }

    async fn finish_queue(&self) {
        info!("📭 Cola vacía en guild {}, desconectando", self.guild_id);
        self.notify(StatusUpdate::QueueEmpty).await;
        self.disconnect().await;
    }

    async fn handle_stream_event(self: &Arc<Self>, generation: u64, event: StreamEvent) {
        if self.inner.lock().generation != generation {
            debug!("Evento {:?} de un stream anterior ignorado", event);
            return;
        }

        match event {
            // Solo el primer aviso marca el inicio real; los siguientes son reanudaciones
            StreamEvent::Start => {
                let mut inner = self.inner.lock();
                if !inner.stream_started && inner.paused_since.is_none() {
                    inner.stream_started = true;
                    inner.start_time = Some(Instant::now());
                }
            }
            StreamEvent::Finish => self.on_stream_finished(generation),
            StreamEvent::Error(reason) => {
                error!("❌ Error en el stream de guild {}: {}", self.guild_id, reason);
                let title = self
                    .current()
                    .map(|e| e.title().to_string())
                    .unwrap_or_default();
                self.notify(StatusUpdate::PlaybackFailed {
                    title,
                    reason: reason.clone(),
                })
                .await;

                if self.skip_failed(&MusicError::StreamFailure(reason)).await {
                    self.play().await;
                }
            }
        }
    }

    fn on_stream_finished(self: &Arc<Self>, generation: u64) {
        let delay = {
            let inner = self.inner.lock();
            let Some(entry) = &inner.current else {
                return;
            };
            let elapsed = match inner.start_time {
                Some(start) => Instant::now().saturating_duration_since(start),
                None => Duration::ZERO,
            };
            finish_delay(
                entry.basic_info.kind(),
                entry.basic_info.duration_seconds,
                elapsed,
                &self.timings,
            )
        };

        info!(
            "🏁 Stream terminado en guild {} (espera {:?})",
            self.guild_id, delay
        );

        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.complete_track(generation).await;
        });

        if let Some(previous) = self.inner.lock().finish_task.replace(task) {
            previous.abort();
        }
    }

    async fn complete_track(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            // Esta misma tarea; no abortarla
            inner.finish_task.take();
        }
        self.release_stream();

        if self.queue.loop_enabled() {
            self.play().await;
            return;
        }
        if self.queue.once_loop_enabled() {
            self.queue.set_once_loop_enabled(false);
            self.play().await;
            return;
        }

        self.queue.next().await;
        self.continue_mix().await;

        if self.queue.is_empty() {
            self.finish_queue().await;
        } else {
            self.play().await;
        }
    }

    fn release_stream(&self) -> bool {
        let stream = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.start_time = None;
            inner.paused_since = None;
            inner.stream_started = false;
            inner.current = None;
            inner.stream.take()
        };
        self.status.set(PlayerState::Idle);

        match stream {
            Some(stream) => {
                stream.destroy();
                true
            }
            None => false,
        }
    }

    /// Detiene el stream sin salir del canal. Idempotente.
    pub fn stop(&self) {
        info!("⏹️ Stop() llamado en guild {}", self.guild_id);
        if let Some(task) = self.inner.lock().finish_task.take() {
            task.abort();
        }
        self.release_stream();
    }

    /// Detiene y sale del canal de voz.
    pub async fn disconnect(&self) {
        self.stop();
        self.queue.disable_mix_playlist().await;

        let connection = self.inner.lock().connection.take();
        match connection {
            Some(connection) => {
                info!(
                    "👋 Guild {} desconectado del canal {}",
                    self.guild_id,
                    connection.channel_id()
                );
                connection.disconnect().await;
            }
            None => warn!("⚠️ Disconnect() en guild {} sin conexión", self.guild_id),
        }
    }

    pub fn pause(&self) -> bool {
        info!("⏸️ Pause() llamado en guild {}", self.guild_id);
        let mut inner = self.inner.lock();
        let Some(stream) = inner.stream.clone() else {
            return false;
        };
        if !self.status.transition(PlayerState::Playing, PlayerState::Paused) {
            return false;
        }
        stream.pause();
        inner.paused_since = Some(Instant::now());
        true
    }

    pub fn resume(&self) -> bool {
        info!("▶️ Resume() llamado en guild {}", self.guild_id);
        let mut inner = self.inner.lock();
        let Some(stream) = inner.stream.clone() else {
            return false;
        };
        if !self.status.transition(PlayerState::Paused, PlayerState::Playing) {
            return false;
        }
        stream.resume();
        if let Some(paused_since) = inner.paused_since.take() {
            let paused_for = Instant::now().saturating_duration_since(paused_since);
            inner.start_time = inner.start_time.map(|start| start + paused_for);
        }
        true
    }

    /// Vuelve a empezar la pista actual.
    pub async fn rewind(self: &Arc<Self>) {
        info!("⏮️ Rewind() llamado en guild {}", self.guild_id);
        self.stop();
        self.play().await;
    }

    /// Cambia el volumen (porcentaje); se mantiene entre pistas.
    pub fn set_volume(&self, percent: u8) -> bool {
        let mut inner = self.inner.lock();
        inner.volume = percent;
        info!("🔊 Volumen de guild {} ajustado a {}%", self.guild_id, percent);
        match &inner.stream {
            Some(stream) => {
                stream.set_volume(linear_volume(percent));
                true
            }
            None => false,
        }
    }

    async fn notify(&self, update: StatusUpdate) {
        let Some(channel_id) = self.settings.bound_channel() else {
            return;
        };
        if let Err(e) = self.notifier.send(channel_id, update).await {
            warn!("⚠️ No se pudo enviar el aviso al canal {}: {}", channel_id, e);
        }
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(task) = inner.finish_task.take() {
            task.abort();
        }
        if let Some(stream) = inner.stream.take() {
            stream.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            notify::{MockChannelNotifier, NullNotifier},
            queue::{AddOptions, AddedBy, QueueLimits},
            stream::VoiceConnector,
        },
        session::testing::{settle, wait_until, FakeMix, FakeResolver, FakeVoice},
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        player: Arc<PlaybackManager>,
        queue: Arc<QueueManager>,
        voice: FakeVoice,
        resolver: Arc<FakeResolver>,
    }

    async fn harness_with(notifier: Arc<dyn ChannelNotifier>, bound: u64) -> Harness {
        let resolver = Arc::new(FakeResolver::new());
        let settings = Arc::new(GuildSettings::new(bound));
        let status = Arc::new(PlaybackStatus::new());
        let queue = Arc::new(QueueManager::new(
            7,
            QueueLimits::default(),
            resolver.clone(),
            Arc::new(FakeMix::new(vec![])),
            settings.clone(),
            status.clone(),
        ));
        let player = PlaybackManager::new(
            7,
            queue.clone(),
            status,
            settings,
            notifier,
            PlaybackTimings::default(),
            100,
        );
        let voice = FakeVoice::new();
        player.set_connection(voice.connect(7, 99).await.unwrap());

        Harness {
            player,
            queue,
            voice,
            resolver,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(NullNotifier), 0).await
    }

    async fn add(h: &Harness, url: &str) {
        h.queue
            .add_queue_only(AddOptions::new(url).added_by(Some(AddedBy::new(1, "u"))))
            .await
            .unwrap();
    }

    #[test]
    fn finish_delay_waits_for_estimated_end() {
        let timings = PlaybackTimings::default();
        assert_eq!(
            finish_delay(SourceKind::Custom, 200, Duration::ZERO, &timings),
            Duration::from_millis(5000)
        );
        assert_eq!(
            finish_delay(SourceKind::YouTube, 200, Duration::from_secs(198), &timings),
            Duration::from_millis(3500)
        );
        assert_eq!(
            finish_delay(SourceKind::YouTube, 200, Duration::from_secs(201), &timings),
            Duration::ZERO
        );
        assert_eq!(
            finish_delay(SourceKind::Unknown, 0, Duration::from_secs(3), &timings),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn play_without_connection_does_nothing() {
        let h = harness().await;
        h.player.disconnect().await;
        add(&h, "https://a.test/A").await;

        h.player.play().await;

        assert_eq!(h.player.state(), PlayerState::Idle);
        assert!(h.voice.played().is_empty());
    }

    #[tokio::test]
    async fn play_starts_head_and_ignores_second_call() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;

        h.player.play().await;
        h.player.play().await;

        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.voice.played(), vec!["https://a.test/A"]);
        assert_eq!(h.player.current().unwrap().url(), "https://a.test/A");
    }

    #[tokio::test]
    async fn failed_stream_is_skipped_and_loop_disabled() {
        let h = harness().await;
        add(&h, "https://a.test/broken-stream").await;
        add(&h, "https://a.test/B").await;
        h.queue.set_loop_enabled(true);

        h.player.play().await;

        assert!(!h.queue.loop_enabled());
        assert_eq!(h.voice.played(), vec!["https://a.test/B"]);
        assert_eq!(h.queue.len(), 1);
        assert_eq!(h.player.state(), PlayerState::Playing);
    }

    #[tokio::test]
    async fn exhausting_queue_through_failures_disconnects() {
        let empties = Arc::new(AtomicUsize::new(0));
        let counter = empties.clone();
        let mut notifier = MockChannelNotifier::new();
        notifier.expect_send().returning(move |channel, update| {
            if channel == 5 && matches!(update, StatusUpdate::QueueEmpty) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        let h = harness_with(Arc::new(notifier), 5).await;
        add(&h, "https://a.test/broken-1").await;
        add(&h, "https://a.test/broken-2").await;

        h.player.play().await;

        assert!(h.queue.is_empty());
        assert!(!h.player.is_connected());
        assert_eq!(h.voice.disconnects(), 1);
        assert_eq!(h.player.state(), PlayerState::Idle);
        assert_eq!(empties.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_stream_advances_to_next_track() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.player.play().await;

        h.voice.emit_last(StreamEvent::Finish);
        wait_until(|| h.voice.played().len() == 2).await;

        assert_eq!(h.voice.played(), vec!["https://a.test/A", "https://a.test/B"]);
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_stream_waits_for_estimated_end() {
        let h = harness().await;
        h.resolver.set_duration(60);
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.player.play().await;

        tokio::time::advance(Duration::from_secs(50)).await;
        h.voice.emit_last(StreamEvent::Finish);

        // Faltan 10s + gracia
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.voice.played().len(), 1);

        wait_until(|| h.voice.played().len() == 2).await;
        assert_eq!(h.queue.get(0).unwrap().url(), "https://a.test/B");
    }

    #[tokio::test(start_paused = true)]
    async fn track_loop_replays_head() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.queue.set_loop_enabled(true);
        h.player.play().await;

        h.voice.emit_last(StreamEvent::Finish);
        wait_until(|| h.voice.played().len() == 2).await;

        assert_eq!(h.voice.played(), vec!["https://a.test/A", "https://a.test/A"]);
        assert_eq!(h.queue.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_track_finishing_disconnects() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        h.player.play().await;

        h.voice.emit_last(StreamEvent::Finish);
        wait_until(|| !h.player.is_connected()).await;

        assert!(h.queue.is_empty());
        assert_eq!(h.voice.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_skips_to_next() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.player.play().await;

        h.voice.emit_last(StreamEvent::Error("corte de red".into()));
        wait_until(|| h.voice.played().len() == 2).await;

        assert_eq!(h.queue.get(0).unwrap().url(), "https://a.test/B");
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_stopped_stream_are_ignored() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.player.play().await;

        let stale = h.voice.last_sink().unwrap();
        h.player.stop();
        stale.emit(StreamEvent::Finish);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.queue.len(), 2);
        assert_eq!(h.voice.played().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_compensates_paused_time() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        h.player.play().await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(h.player.pause());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(h.player.current_time(), Duration::from_secs(10));

        assert!(h.player.resume());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(h.player.current_time(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn first_start_event_marks_real_start() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        h.player.play().await;

        // Carga antes de que suene el audio
        tokio::time::advance(Duration::from_secs(2)).await;
        h.voice.emit_last(StreamEvent::Start);
        settle().await;
        assert_eq!(h.player.current_time(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(h.player.current_time(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn start_event_after_resume_keeps_elapsed_time() {
        let h = harness().await;
        h.resolver.set_duration(300);
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.player.play().await;
        h.voice.emit_last(StreamEvent::Start);
        settle().await;

        tokio::time::advance(Duration::from_secs(240)).await;
        assert!(h.player.pause());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(h.player.resume());
        h.voice.emit_last(StreamEvent::Start);
        settle().await;

        assert_eq!(h.player.current_time(), Duration::from_secs(240));

        tokio::time::advance(Duration::from_secs(60)).await;
        h.voice.emit_last(StreamEvent::Finish);
        // Solo queda la gracia
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.voice.played(), vec!["https://a.test/A", "https://a.test/B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn once_loop_replays_head_a_single_time() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        h.queue.set_once_loop_enabled(true);
        h.player.play().await;

        h.voice.emit_last(StreamEvent::Finish);
        wait_until(|| h.voice.played().len() == 2).await;
        assert!(!h.queue.once_loop_enabled());
        assert_eq!(h.queue.len(), 2);

        h.voice.emit_last(StreamEvent::Finish);
        wait_until(|| h.voice.played().len() == 3).await;

        assert_eq!(
            h.voice.played(),
            vec!["https://a.test/A", "https://a.test/A", "https://a.test/B"]
        );
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test]
    async fn volume_is_kept_across_tracks() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        add(&h, "https://a.test/B").await;
        assert!(!h.player.set_volume(50));

        h.player.play().await;
        assert_eq!(h.voice.volumes(), vec![0.5]);

        assert!(h.player.set_volume(150));
        h.player.stop();
        h.queue.next().await;
        h.player.play().await;
        assert_eq!(h.voice.volumes(), vec![0.5, 1.5, 1.5]);
    }

    #[tokio::test]
    async fn rewind_restarts_same_head() {
        let h = harness().await;
        add(&h, "https://a.test/A").await;
        h.player.play().await;

        h.player.rewind().await;

        assert_eq!(h.voice.played(), vec!["https://a.test/A", "https://a.test/A"]);
        assert_eq!(h.voice.destroyed(), 1);
    }
}
