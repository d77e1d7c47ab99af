use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use super::{
    cancellation::TaskCancellation,
    notify::{StatusMessage, StatusUpdate},
    state::{GuildSettings, PlaybackStatus},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::{
        AudioSourceResolver, MixPlaylistSource, MixSession, ResolveRequest, ServiceKind,
        SourceKind, TrackSource,
    },
};

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Por debajo de esta duración de cola los añadidos se guardan en caché.
const CACHE_QUEUE_THRESHOLD_SECS: u64 = 4 * 60 * 60;

/// Quién pidió la pista.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedBy {
    pub user_id: u64,
    pub display_name: String,
}

impl AddedBy {
    pub fn new(user_id: u64, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }

    /// Añadidos del sistema (relacionados, mix).
    pub fn unknown() -> Self {
        Self::new(0, "Desconocido")
    }

    pub fn is_unknown(&self) -> bool {
        self.user_id == 0
    }
}

/// Elemento de la cola.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Identidad estable dentro del proceso.
    pub id: u64,
    pub basic_info: Arc<TrackSource>,
    pub added_by: AddedBy,
}

impl QueueEntry {
    pub fn new(basic_info: TrackSource, added_by: AddedBy) -> Self {
        Self {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            basic_info: Arc::new(basic_info),
            added_by,
        }
    }

    pub fn title(&self) -> &str {
        &self.basic_info.title
    }

    pub fn url(&self) -> &str {
        &self.basic_info.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    #[default]
    Append,
    Prepend,
}

/// Notificaciones de la cola.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// La cabeza (índice 0) se vio afectada.
    Change,
    ChangeWithoutCurrent,
    Add(QueueEntry),
    SettingsChanged,
    MixPlaylistEnabledChanged(bool),
}

/// Parámetros de [`QueueManager::add_queue_only`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub url: String,
    pub added_by: Option<AddedBy>,
    pub mode: InsertMode,
    pub hint: Option<SourceKind>,
    pub known: Option<TrackSource>,
    /// No forzar la caché aunque la cola sea corta.
    pub prevent_cache: bool,
    /// Fuente privada: sin caché y fuera de listados públicos.
    pub private: bool,
}

impl AddOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn added_by(mut self, added_by: Option<AddedBy>) -> Self {
        self.added_by = added_by;
        self
    }

    pub fn mode(mut self, mode: InsertMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn hint(mut self, hint: SourceKind) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn known(mut self, known: TrackSource) -> Self {
        self.known = Some(known);
        self
    }

    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }
}

/// Resultado de un añadido.
#[derive(Debug, Clone)]
pub struct AddedEntry {
    pub entry: QueueEntry,
    pub index: usize,
    revision: u64,
}

/// Resultado de [`QueueManager::add_queue`].
#[derive(Debug, Clone)]
pub struct AddedTrack {
    pub entry: QueueEntry,
    pub index: usize,
    pub eta: Option<Duration>,
    pub cancel: Option<CancelLastAdd>,
}

/// Permiso para deshacer un añadido.
///
/// Vale hasta que caduca la ventana o cambia la cola, lo que ocurra antes.
#[derive(Debug, Clone)]
pub struct CancelLastAdd {
    entry_id: u64,
    revision: u64,
    expires_at: Instant,
}

impl CancelLastAdd {
    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PlaylistResult {
    pub added: Vec<QueueEntry>,
    /// Elementos cuyo añadido llegó a intentarse.
    pub attempted: usize,
    pub outcome: PlaylistOutcome,
}

/// Parámetros comunes de una importación en lote.
#[derive(Debug, Clone)]
pub struct PlaylistRequest {
    pub title: String,
    pub added_by: Option<AddedBy>,
    pub mode: InsertMode,
    pub hint: SourceKind,
}

/// Página de la cola para listados.
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub entries: Vec<(usize, QueueEntry)>,
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    pub max_size: usize,
    pub cancel_window: Duration,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_size: 999,
            cancel_window: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<QueueEntry>,
    loop_enabled: bool,
    queue_loop_enabled: bool,
    once_loop_enabled: bool,
}

/// Cola de un servidor.
pub struct QueueManager {
    guild_id: u64,
    state: RwLock<QueueState>,
    // Serializa resolución + inserción
    add_lock: Mutex<()>,
    mix: Mutex<Option<Box<dyn MixSession>>>,
    mix_enabled: AtomicBool,
    revision: AtomicU64,
    events: broadcast::Sender<QueueEvent>,
    resolver: Arc<dyn AudioSourceResolver>,
    mix_source: Arc<dyn MixPlaylistSource>,
    settings: Arc<GuildSettings>,
    status: Arc<PlaybackStatus>,
    limits: QueueLimits,
}

impl QueueManager {
    pub fn new(
        guild_id: u64,
        limits: QueueLimits,
        resolver: Arc<dyn AudioSourceResolver>,
        mix_source: Arc<dyn MixPlaylistSource>,
        settings: Arc<GuildSettings>,
        status: Arc<PlaybackStatus>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        debug!("📋 QueueManager creado para guild {}", guild_id);

        Self {
            guild_id,
            state: RwLock::new(QueueState::default()),
            add_lock: Mutex::new(()),
            mix: Mutex::new(None),
            mix_enabled: AtomicBool::new(false),
            revision: AtomicU64::new(0),
            events,
            resolver,
            mix_source,
            settings,
            status,
            limits,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        if matches!(event, QueueEvent::Change | QueueEvent::ChangeWithoutCurrent) {
            self.revision.fetch_add(1, Ordering::SeqCst);
        }
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }

    fn emit_change(&self, current_affected: bool) {
        self.emit(if current_affected {
            QueueEvent::Change
        } else {
            QueueEvent::ChangeWithoutCurrent
        });
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    // ---- consultas ----

    pub fn get(&self, index: usize) -> Option<QueueEntry> {
        self.state.read().entries.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Longitud sin contar fuentes privadas.
    pub fn public_len(&self) -> usize {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| !e.basic_info.private)
            .count()
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.state.read().entries.clone()
    }

    /// Duración total en segundos; `None` si hay directos o desconocidas.
    pub fn length_seconds(&self) -> Option<u64> {
        Self::sum_length(&self.state.read().entries)
    }

    fn sum_length(entries: &[QueueEntry]) -> Option<u64> {
        entries
            .iter()
            .filter(|e| !e.basic_info.private)
            .try_fold(0u64, |acc, e| {
                (!e.basic_info.has_unknown_length()).then(|| acc + e.basic_info.duration_seconds)
            })
    }

    /// Duración conocida, ignorando directos y desconocidos.
    pub fn length_seconds_actual(&self) -> u64 {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| !e.basic_info.private && !e.basic_info.is_live())
            .map(|e| e.basic_info.duration_seconds)
            .sum()
    }

    /// Suma de duraciones desde la cabeza hasta `index`, inclusive.
    pub fn length_seconds_to(&self, index: usize) -> u64 {
        self.state
            .read()
            .entries
            .iter()
            .take(index.saturating_add(1))
            .map(|e| e.basic_info.duration_seconds)
            .sum()
    }

    /// Tiempo estimado hasta que suene `index`.
    pub fn eta(&self, index: usize, elapsed: Duration) -> Option<Duration> {
        if index == 0 {
            return None;
        }

        {
            let state = self.state.read();
            let before = state.entries.get(..index)?;
            if before.iter().any(|e| e.basic_info.has_unknown_length()) {
                return None;
            }
        }

        Some(Duration::from_secs(self.length_seconds_to(index - 1)).saturating_sub(elapsed))
    }

    pub fn get_page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let state = self.state.read();
        let total_pages = state.entries.len().div_ceil(per_page).max(1);
        let page = page.min(total_pages - 1);

        QueuePage {
            entries: state
                .entries
                .iter()
                .enumerate()
                .skip(page * per_page)
                .take(per_page)
                .map(|(i, e)| (i, e.clone()))
                .collect(),
            page,
            total_pages,
        }
    }

    // ---- banderas de bucle ----

    pub fn loop_enabled(&self) -> bool {
        self.state.read().loop_enabled
    }

    pub fn set_loop_enabled(&self, value: bool) {
        self.state.write().loop_enabled = value;
        self.emit(QueueEvent::SettingsChanged);
    }

    pub fn queue_loop_enabled(&self) -> bool {
        self.state.read().queue_loop_enabled
    }

    pub fn set_queue_loop_enabled(&self, value: bool) {
        self.state.write().queue_loop_enabled = value;
        self.emit(QueueEvent::SettingsChanged);
    }

    pub fn once_loop_enabled(&self) -> bool {
        self.state.read().once_loop_enabled
    }

    pub fn set_once_loop_enabled(&self, value: bool) {
        self.state.write().once_loop_enabled = value;
        self.emit(QueueEvent::SettingsChanged);
    }

    // ---- añadir ----

    /// Resuelve e inserta una pista. Las llamadas concurrentes se ejecutan de una en una.
    pub async fn add_queue_only(&self, options: AddOptions) -> MusicResult<AddedEntry> {
        let _guard = self.add_lock.lock().await;
        info!("➕ AddQueue llamado en guild {}: {}", self.guild_id, options.url);

        let (len, length_seconds) = {
            let state = self.state.read();
            (state.entries.len(), Self::sum_length(&state.entries))
        };

        if len >= self.limits.max_size {
            warn!("⚠️ Cola llena en guild {} ({} elementos)", self.guild_id, len);
            return Err(MusicError::QueueFull(self.limits.max_size));
        }

        let force_cache = !options.prevent_cache
            && (len == 0
                || options.mode == InsertMode::Prepend
                || length_seconds.is_some_and(|s| s < CACHE_QUEUE_THRESHOLD_SECS));

        let mut track = self
            .resolver
            .resolve(ResolveRequest {
                url: options.url.clone(),
                hint: options.hint,
                known: options.known,
                force_cache,
                prevent_cache: options.private,
            })
            .await?;
        track.set_private(options.private);

        let entry = QueueEntry::new(track, options.added_by.unwrap_or_else(AddedBy::unknown));

        let index = {
            let mut state = self.state.write();
            match options.mode {
                InsertMode::Append => state.entries.push(entry.clone()),
                // La cabeza que suena no se desplaza
                InsertMode::Prepend if self.has_active_head() && !state.entries.is_empty() => {
                    state.entries.insert(1, entry.clone())
                }
                InsertMode::Prepend => state.entries.insert(0, entry.clone()),
            }

            if self.settings.equal_playback() {
                let entries = std::mem::take(&mut state.entries);
                state.entries = self.interleave(entries, None);
            }

            state
                .entries
                .iter()
                .position(|e| e.id == entry.id)
                .unwrap_or_default()
        };

        self.emit_change(index == 0);
        self.emit(QueueEvent::Add(entry.clone()));
        info!("✅ Añadido en la posición {}: {}", index, entry.title());

        Ok(AddedEntry {
            entry,
            index,
            revision: self.revision(),
        })
    }

    fn has_active_head(&self) -> bool {
        self.status.is_playing() || self.status.is_preparing()
    }

    /// Añade informando al mensaje de estado. Los fallos se informan, no se propagan.
    pub async fn add_queue(
        &self,
        options: AddOptions,
        cancellable: bool,
        elapsed: Duration,
        status: Option<&dyn StatusMessage>,
    ) -> Option<AddedTrack> {
        info!("📥 AutoAddQueue llamado en guild {}", self.guild_id);

        if let Some(message) = status {
            if let Err(e) = message.edit(StatusUpdate::Loading).await {
                warn!("⚠️ No se pudo editar el mensaje de estado: {}", e);
            }
        }

        let cancellable = cancellable
            && options.mode == InsertMode::Append
            && options.added_by.as_ref().is_some_and(|a| !a.is_unknown());

        match self.add_queue_only(options).await {
            Ok(added) => {
                let eta = self.eta(added.index, elapsed);
                let cancel = cancellable.then(|| CancelLastAdd {
                    entry_id: added.entry.id,
                    revision: added.revision,
                    expires_at: Instant::now() + self.limits.cancel_window,
                });

                if let Some(message) = status {
                    let update = StatusUpdate::TrackAdded {
                        entry: added.entry.clone(),
                        index: added.index,
                        eta,
                        cancellable: cancel.is_some(),
                    };
                    if let Err(e) = message.edit(update).await {
                        warn!("⚠️ No se pudo editar el mensaje de estado: {}", e);
                    }
                }

                Some(AddedTrack {
                    entry: added.entry,
                    index: added.index,
                    eta,
                    cancel,
                })
            }
            Err(e) => {
                error!("❌ AutoAddQueue falló en guild {}: {}", self.guild_id, e);
                if let Some(message) = status {
                    let _ = message
                        .edit(StatusUpdate::AddFailed {
                            reason: e.to_string(),
                        })
                        .await;
                }
                None
            }
        }
    }

    /// Deshace un añadido si el permiso sigue vigente.
    pub fn cancel_last_add(&self, ticket: &CancelLastAdd) -> MusicResult<QueueEntry> {
        if ticket.is_expired() || self.revision() != ticket.revision {
            return Err(MusicError::InvalidOperation(
                "El botón de cancelar ya no es válido".to_string(),
            ));
        }

        let index = self
            .state
            .read()
            .entries
            .iter()
            .position(|e| e.id == ticket.entry_id)
            .ok_or_else(|| MusicError::InvalidOperation("La pista ya no está en la cola".into()))?;

        self.remove_at(index)
    }

    /// Añade una lista elemento a elemento, tolerando fallos sueltos.
    pub async fn process_playlist<T, F, Fut>(
        &self,
        cancellation: &TaskCancellation,
        request: PlaylistRequest,
        items: Vec<T>,
        mut to_known: F,
        progress: Option<&dyn StatusMessage>,
    ) -> PlaylistResult
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = MusicResult<TrackSource>>,
    {
        let total = items.len();
        let mut added = Vec::new();
        let mut attempted = 0;

        info!("📋 Procesando lista '{}' ({} elementos)", request.title, total);

        for item in items {
            if cancellation.is_cancelled() {
                info!("🛑 Lista '{}' cancelada tras {} elementos", request.title, attempted);
                return PlaylistResult {
                    added,
                    attempted,
                    outcome: PlaylistOutcome::Cancelled,
                };
            }
            attempted += 1;

            let known = match to_known(item).await {
                Ok(known) => known,
                Err(e) => {
                    warn!("⚠️ Elemento {} de la lista omitido: {}", attempted, e);
                    continue;
                }
            };

            let options = AddOptions {
                url: known.url.clone(),
                added_by: request.added_by.clone(),
                mode: request.mode,
                hint: Some(request.hint),
                known: Some(known),
                ..Default::default()
            };

            match self.add_queue_only(options).await {
                Ok(result) => {
                    added.push(result.entry);
                    if should_report_progress(added.len(), total) {
                        if let Some(message) = progress {
                            let update = StatusUpdate::PlaylistProgress {
                                title: request.title.clone(),
                                processed: added.len(),
                                total,
                            };
                            if let Err(e) = message.edit(update).await {
                                warn!("⚠️ No se pudo informar el progreso: {}", e);
                            }
                        }
                    }
                }
                Err(MusicError::QueueFull(max)) => {
                    warn!("⚠️ Cola llena ({}), se detiene la lista", max);
                    break;
                }
                Err(e) => warn!("⚠️ Elemento {} de la lista omitido: {}", attempted, e),
            }
        }

        PlaylistResult {
            added,
            attempted,
            outcome: PlaylistOutcome::Completed,
        }
    }

    // ---- avanzar ----

    /// Pasa a la siguiente pista según bucle de cola o relacionados.
    pub async fn next(&self) {
        info!("⏭️ Next llamado en guild {}", self.guild_id);

        let (was_once_loop, queue_loop, head) = {
            let mut state = self.state.write();
            let was_once_loop = std::mem::replace(&mut state.once_loop_enabled, false);
            (was_once_loop, state.queue_loop_enabled, state.entries.first().cloned())
        };
        if was_once_loop {
            self.emit(QueueEvent::SettingsChanged);
        }
        self.status.reset_error();

        let Some(head) = head else {
            debug!("Cola vacía en guild {}, nada que avanzar", self.guild_id);
            return;
        };

        if queue_loop {
            let mut state = self.state.write();
            if state.entries.first().map(|e| e.id) == Some(head.id) {
                let first = state.entries.remove(0);
                state.entries.push(first);
            }
            drop(state);
            self.emit(QueueEvent::Change);
            return;
        }

        if self.settings.add_related() {
            if let Some(related) = head.basic_info.related().first().cloned() {
                let known = related.title.clone().map(|title| {
                    TrackSource::new(title, related.url.clone(), ServiceKind::bare(SourceKind::YouTube))
                        .with_duration(related.duration_seconds)
                });

                let mut options = AddOptions::new(related.url.clone()).hint(SourceKind::YouTube);
                options.known = known;

                if let Err(e) = self.add_queue_only(options).await {
                    warn!("⚠️ No se pudo añadir el relacionado {}: {}", related.url, e);
                }
            }
        }

        {
            let mut state = self.state.write();
            if state.entries.first().map(|e| e.id) == Some(head.id) {
                state.entries.remove(0);
            } else {
                warn!("⚠️ La cabeza cambió durante next() en guild {}", self.guild_id);
            }
        }
        self.emit(QueueEvent::Change);
    }

    // ---- quitar y reordenar ----

    pub fn remove_at(&self, index: usize) -> MusicResult<QueueEntry> {
        info!("🗑️ RemoveAt llamado (índice {})", index);

        if index == 0 && self.has_active_head() {
            return Err(MusicError::InvalidOperation(
                "No se puede quitar la canción que está sonando".to_string(),
            ));
        }

        let removed = {
            let mut state = self.state.write();
            if index >= state.entries.len() {
                return Err(MusicError::InvalidOperation(format!(
                    "Índice fuera de rango: {}",
                    index
                )));
            }
            state.entries.remove(index)
        };

        self.emit_change(index == 0);
        Ok(removed)
    }

    pub fn remove_all(&self) {
        info!("🗑️ RemoveAll llamado");
        self.state.write().entries.clear();
        self.emit(QueueEvent::Change);
    }

    /// Deja solo la cabeza.
    pub fn remove_from_2nd(&self) {
        info!("🗑️ RemoveFrom2nd llamado");
        self.state.write().entries.truncate(1);
        self.emit(QueueEvent::ChangeWithoutCurrent);
    }

    /// Quita los elementos que cumplan `predicate` y devuelve sus índices originales.
    pub fn remove_if(&self, predicate: impl Fn(&QueueEntry) -> bool) -> Vec<usize> {
        info!("🗑️ RemoveIf llamado");

        let first = if self.has_active_head() { 1 } else { 0 };
        let removed: Vec<usize> = {
            let mut state = self.state.write();
            let indexes: Vec<usize> = state
                .entries
                .iter()
                .enumerate()
                .skip(first)
                .filter(|(_, e)| predicate(e))
                .map(|(i, _)| i)
                .collect();

            for &i in indexes.iter().rev() {
                state.entries.remove(i);
            }
            indexes
        };

        if !removed.is_empty() {
            self.emit_change(removed.contains(&0));
        }
        removed
    }

    /// Mueve un elemento desplazando el rango intermedio.
    pub fn move_entry(&self, from: usize, to: usize) -> MusicResult<()> {
        info!("↕️ Move llamado ({} -> {})", from, to);

        if (from == 0 || to == 0) && self.has_active_head() {
            return Err(MusicError::InvalidOperation(
                "No se puede mover la canción que está sonando".to_string(),
            ));
        }

        {
            let mut state = self.state.write();
            let len = state.entries.len();
            if from >= len || to >= len {
                return Err(MusicError::InvalidOperation(format!(
                    "Índices fuera de rango: {} -> {}",
                    from, to
                )));
            }
            if from == to {
                return Ok(());
            }

            let entry = state.entries.remove(from);
            state.entries.insert(to, entry);
        }

        self.emit_change(from == 0 || to == 0);
        Ok(())
    }

    /// Baraja la cola; con un stream activo la cabeza no se mueve.
    pub fn shuffle(&self) {
        info!("🔀 Shuffle llamado");

        let pinned = self.has_active_head();
        let order = {
            let mut state = self.state.write();
            if state.entries.is_empty() {
                return;
            }

            let order = requester_order(&state.entries);
            let mut rng = rand::thread_rng();
            if pinned {
                state.entries[1..].shuffle(&mut rng);
            } else {
                state.entries.shuffle(&mut rng);
            }
            order
        };

        self.emit_change(!pinned);

        if self.settings.equal_playback() {
            self.sort_with_added_by(Some(order));
        }
    }

    /// Intercala por solicitante para que nadie acapare posiciones seguidas.
    pub fn sort_with_added_by(&self, prior_order: Option<Vec<u64>>) {
        {
            let mut state = self.state.write();
            let entries = std::mem::take(&mut state.entries);
            state.entries = self.interleave(entries, prior_order.as_deref());
        }
        self.emit(QueueEvent::ChangeWithoutCurrent);
    }

    /// Reparto por solicitante; con reproducción activa la cabeza no se mueve.
    fn interleave(&self, entries: Vec<QueueEntry>, prior_order: Option<&[u64]>) -> Vec<QueueEntry> {
        let head_user = match entries.first() {
            Some(head) if self.has_active_head() => head.added_by.user_id,
            _ => return interleave_by_requester(entries, prior_order),
        };

        // El solicitante de la cabeza va primero y la cabeza abre su grupo
        let mut order: Vec<u64> = prior_order.map(<[u64]>::to_vec).unwrap_or_default();
        order.retain(|&user| user != head_user);
        order.insert(0, head_user);
        interleave_by_requester(entries, Some(&order))
    }

    // ---- mix ----

    pub fn mix_playlist_enabled(&self) -> bool {
        self.mix_enabled.load(Ordering::SeqCst)
    }

    fn set_mix_enabled(&self, enabled: bool) {
        if self.mix_enabled.swap(enabled, Ordering::SeqCst) != enabled {
            self.emit(QueueEvent::MixPlaylistEnabledChanged(enabled));
        }
    }

    /// Inicia una sesión de mix a partir de `url` y deja un elemento preparado.
    pub async fn enable_mix_playlist(
        &self,
        url: &str,
        requester: Option<AddedBy>,
        skip_adding_base: bool,
    ) -> MusicResult<()> {
        info!("🎛️ Activando mix en guild {}: {}", self.guild_id, url);

        let session = self.mix_source.start(url).await?;
        *self.mix.lock().await = Some(session);
        self.set_mix_enabled(true);

        if skip_adding_base {
            self.prepare_next_mix_item().await?;
        } else {
            self.add_queue_only(
                AddOptions::new(url)
                    .added_by(requester)
                    .hint(SourceKind::YouTube),
            )
            .await?;
        }

        self.prepare_next_mix_item().await
    }

    /// Avanza el mix y añade el siguiente elemento; se desactiva al agotarse.
    pub async fn prepare_next_mix_item(&self) -> MusicResult<()> {
        if !self.mix_playlist_enabled() {
            return Err(MusicError::MixPlaylistDisabled);
        }

        loop {
            let item = {
                let mut mix = self.mix.lock().await;
                let Some(session) = mix.as_mut() else {
                    return Err(MusicError::MixPlaylistDisabled);
                };
                session.advance().await.map_err(MusicError::resolution)?
            };

            let Some(item) = item else {
                info!("🎛️ Mix agotado en guild {}", self.guild_id);
                self.disable_mix_playlist().await;
                return Ok(());
            };

            // Elementos sin URL se saltan
            let Some(track) = item.into_track() else {
                debug!("Elemento de mix sin URL, se salta");
                continue;
            };

            let options = AddOptions::new(track.url.clone())
                .hint(SourceKind::YouTube)
                .known(track);
            self.add_queue_only(options).await?;
            return Ok(());
        }
    }

    pub async fn disable_mix_playlist(&self) {
        *self.mix.lock().await = None;
        self.set_mix_enabled(false);
    }
}

/// Progreso cada 50 elementos, o más a menudo en listas cortas.
fn should_report_progress(processed: usize, total: usize) -> bool {
    processed % 50 == 0
        || (total <= 50 && processed % 10 == 0)
        || (total <= 10 && processed % 4 == 0)
}

fn requester_order(entries: &[QueueEntry]) -> Vec<u64> {
    let mut order = Vec::new();
    for entry in entries {
        if !order.contains(&entry.added_by.user_id) {
            order.push(entry.added_by.user_id);
        }
    }
    order
}

/// Agrupa por solicitante (orden dado o de aparición) e intercala por rondas.
fn interleave_by_requester(entries: Vec<QueueEntry>, prior_order: Option<&[u64]>) -> Vec<QueueEntry> {
    let mut order: Vec<u64> = prior_order.map(<[u64]>::to_vec).unwrap_or_default();
    let mut groups: HashMap<u64, VecDeque<QueueEntry>> = HashMap::new();
    let total = entries.len();

    for entry in entries {
        let user_id = entry.added_by.user_id;
        if !order.contains(&user_id) {
            order.push(user_id);
        }
        groups.entry(user_id).or_default().push_back(entry);
    }

    let mut sorted = Vec::with_capacity(total);
    while sorted.len() < total {
        for user_id in &order {
            if let Some(entry) = groups.get_mut(user_id).and_then(VecDeque::pop_front) {
                sorted.push(entry);
            }
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{notify::MockStatusMessage, state::PlayerState},
        session::testing::{FakeMix, FakeResolver},
        sources::RelatedTrack,
    };
    use pretty_assertions::assert_eq;

    struct Harness {
        queue: Arc<QueueManager>,
        resolver: Arc<FakeResolver>,
        settings: Arc<GuildSettings>,
        status: Arc<PlaybackStatus>,
    }

    fn harness_with(limits: QueueLimits, mix: FakeMix) -> Harness {
        let resolver = Arc::new(FakeResolver::new());
        let settings = Arc::new(GuildSettings::new(0));
        let status = Arc::new(PlaybackStatus::new());
        let queue = Arc::new(QueueManager::new(
            1,
            limits,
            resolver.clone(),
            Arc::new(mix),
            settings.clone(),
            status.clone(),
        ));
        Harness {
            queue,
            resolver,
            settings,
            status,
        }
    }

    fn harness() -> Harness {
        harness_with(QueueLimits::default(), FakeMix::new(vec![]))
    }

    fn user(id: u64) -> Option<AddedBy> {
        Some(AddedBy::new(id, format!("user{}", id)))
    }

    async fn add(h: &Harness, url: &str, by: u64) -> AddedEntry {
        h.queue
            .add_queue_only(AddOptions::new(url).added_by(user(by)))
            .await
            .unwrap()
    }

    fn urls(queue: &QueueManager) -> Vec<String> {
        queue.snapshot().iter().map(|e| e.url().to_string()).collect()
    }

    #[tokio::test]
    async fn first_append_is_index_zero_and_emits_change() {
        let h = harness();
        let mut events = h.queue.subscribe();

        let added = add(&h, "https://a.test/x", 1).await;

        assert_eq!(added.index, 0);
        assert_eq!(urls(&h.queue), vec!["https://a.test/x"]);
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Change);
        assert!(matches!(events.recv().await.unwrap(), QueueEvent::Add(_)));
    }

    #[tokio::test]
    async fn later_append_emits_change_without_current() {
        let h = harness();
        add(&h, "https://a.test/1", 1).await;
        let mut events = h.queue.subscribe();

        let added = add(&h, "https://a.test/2", 1).await;
        assert_eq!(added.index, 1);
        assert_eq!(events.recv().await.unwrap(), QueueEvent::ChangeWithoutCurrent);
    }

    #[tokio::test]
    async fn failed_resolution_inserts_nothing() {
        let h = harness();
        let result = h
            .queue
            .add_queue_only(AddOptions::new("https://broken.test/unresolvable"))
            .await;
        assert!(matches!(result, Err(MusicError::Resolution(_))));
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn rejects_adds_beyond_max_size() {
        let limits = QueueLimits {
            max_size: 2,
            ..Default::default()
        };
        let h = harness_with(limits, FakeMix::new(vec![]));
        add(&h, "https://a.test/1", 1).await;
        add(&h, "https://a.test/2", 1).await;

        let result = h.queue.add_queue_only(AddOptions::new("https://a.test/3")).await;
        assert_eq!(result.unwrap_err(), MusicError::QueueFull(2));
        assert_eq!(h.queue.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_adds_are_all_inserted() {
        let h = harness();
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let queue = h.queue.clone();
                tokio::spawn(async move {
                    queue
                        .add_queue_only(AddOptions::new(format!("https://a.test/{}", i)))
                        .await
                })
            })
            .collect();

        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.unwrap().unwrap().index);
        }
        indexes.sort_unstable();

        assert_eq!(h.queue.len(), 20);
        assert_eq!(indexes, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn cache_is_forced_only_for_short_queues() {
        let h = harness();
        h.resolver.set_duration(5 * 60 * 60);

        add(&h, "https://a.test/long", 1).await;
        add(&h, "https://a.test/next", 1).await;
        h.queue
            .add_queue_only(AddOptions::new("https://a.test/uncached").added_by(user(1)).mode(InsertMode::Prepend))
            .await
            .unwrap();
        h.queue
            .add_queue_only(AddOptions {
                url: "https://a.test/prevented".into(),
                prevent_cache: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let forced: Vec<bool> = h.resolver.requests().iter().map(|r| r.force_cache).collect();
        assert_eq!(forced, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn private_sources_are_marked_and_excluded() {
        let h = harness();
        h.resolver.set_duration(100);
        add(&h, "https://a.test/public", 1).await;
        h.queue
            .add_queue_only(AddOptions::new("https://a.test/secret").private(true))
            .await
            .unwrap();

        assert_eq!(h.queue.len(), 2);
        assert_eq!(h.queue.public_len(), 1);
        assert_eq!(h.queue.length_seconds(), Some(100));
        assert!(h.resolver.requests()[1].prevent_cache);
    }

    #[tokio::test]
    async fn unknown_durations_make_total_length_indeterminate() {
        let h = harness();
        h.resolver.set_duration(100);
        add(&h, "https://a.test/A", 1).await;
        h.resolver.set_duration(0);
        add(&h, "https://a.test/B", 1).await;

        assert_eq!(h.queue.length_seconds(), None);
        assert_eq!(h.queue.length_seconds_actual(), 100);
    }

    #[tokio::test]
    async fn remove_all_empties_the_queue() {
        let h = harness();
        for url in ["https://a.test/A", "https://a.test/B"] {
            add(&h, url, 1).await;
        }
        let mut events = h.queue.subscribe();

        h.queue.remove_all();

        assert!(h.queue.is_empty());
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Change);
    }

    #[tokio::test]
    async fn prepend_keeps_playing_head_in_place() {
        let h = harness();
        add(&h, "https://a.test/head", 1).await;
        add(&h, "https://a.test/tail", 1).await;
        h.status.set(PlayerState::Playing);

        let added = h
            .queue
            .add_queue_only(AddOptions::new("https://a.test/urgent").mode(InsertMode::Prepend))
            .await
            .unwrap();

        assert_eq!(added.index, 1);
        assert_eq!(
            urls(&h.queue),
            vec!["https://a.test/head", "https://a.test/urgent", "https://a.test/tail"]
        );
    }

    #[tokio::test]
    async fn next_pops_head_and_emits_change() {
        let h = harness();
        h.resolver.set_duration(300);
        add(&h, "https://a.test/A", 1).await;
        h.resolver.set_duration(200);
        add(&h, "https://a.test/B", 1).await;
        let mut events = h.queue.subscribe();

        h.queue.next().await;

        assert_eq!(urls(&h.queue), vec!["https://a.test/B"]);
        assert_eq!(h.queue.get(0).unwrap().basic_info.duration_seconds, 200);
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Change);
    }

    #[tokio::test]
    async fn next_with_queue_loop_rotates_head() {
        let h = harness();
        add(&h, "https://a.test/A", 1).await;
        add(&h, "https://a.test/B", 1).await;
        h.queue.set_queue_loop_enabled(true);

        h.queue.next().await;

        assert_eq!(urls(&h.queue), vec!["https://a.test/B", "https://a.test/A"]);
    }

    #[tokio::test]
    async fn next_clears_once_loop_and_error() {
        let h = harness();
        add(&h, "https://a.test/A", 1).await;
        h.queue.set_once_loop_enabled(true);
        h.status.record_error("boom");

        h.queue.next().await;

        assert!(!h.queue.once_loop_enabled());
        assert_eq!(h.status.last_error(), None);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn next_appends_first_related_track() {
        let h = harness();
        h.settings.set_add_related(true);
        h.resolver.set_related(vec![RelatedTrack {
            url: "https://www.youtube.com/watch?v=rel".into(),
            title: Some("Related".into()),
            duration_seconds: 90,
        }]);
        add(&h, "https://www.youtube.com/watch?v=seed", 1).await;

        h.queue.next().await;

        let entries = h.queue.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title(), "Related");
        assert!(entries[0].added_by.is_unknown());
    }

    #[tokio::test]
    async fn remove_head_while_playing_fails() {
        let h = harness();
        add(&h, "https://a.test/A", 1).await;
        add(&h, "https://a.test/B", 1).await;

        for state in [PlayerState::Preparing, PlayerState::Playing, PlayerState::Paused] {
            h.status.set(state);
            assert!(matches!(
                h.queue.remove_at(0),
                Err(MusicError::InvalidOperation(_))
            ));
            assert_eq!(h.queue.len(), 2);
        }

        h.status.set(PlayerState::Idle);
        let removed = h.queue.remove_at(0).unwrap();
        assert_eq!(removed.url(), "https://a.test/A");
    }

    #[tokio::test]
    async fn remove_if_skips_playing_head() {
        let h = harness();
        add(&h, "https://a.test/drop0", 1).await;
        add(&h, "https://a.test/keep", 2).await;
        add(&h, "https://a.test/drop2", 1).await;
        h.status.set(PlayerState::Playing);

        let removed = h.queue.remove_if(|e| e.added_by.user_id == 1);

        assert_eq!(removed, vec![2]);
        assert_eq!(urls(&h.queue), vec!["https://a.test/drop0", "https://a.test/keep"]);
    }

    #[tokio::test]
    async fn head_is_protected_while_preparing() {
        let h = harness();
        add(&h, "https://a.test/A", 1).await;
        add(&h, "https://a.test/B", 1).await;
        h.status.set(PlayerState::Preparing);

        assert_eq!(h.queue.remove_if(|_| true), vec![1]);
        assert!(matches!(
            h.queue.move_entry(0, 0),
            Err(MusicError::InvalidOperation(_))
        ));
        assert_eq!(urls(&h.queue), vec!["https://a.test/A"]);
    }

    #[tokio::test]
    async fn move_shifts_intervening_range() {
        let h = harness();
        for name in ["A", "B", "C", "D"] {
            add(&h, &format!("https://a.test/{}", name), 1).await;
        }

        h.queue.move_entry(0, 2).unwrap();
        assert_eq!(
            urls(&h.queue),
            vec!["https://a.test/B", "https://a.test/C", "https://a.test/A", "https://a.test/D"]
        );

        h.queue.move_entry(2, 0).unwrap();
        h.queue.move_entry(3, 1).unwrap();
        assert_eq!(
            urls(&h.queue),
            vec!["https://a.test/A", "https://a.test/D", "https://a.test/B", "https://a.test/C"]
        );
    }

    #[tokio::test]
    async fn shuffle_while_playing_pins_head() {
        let h = harness();
        for i in 0..30 {
            add(&h, &format!("https://a.test/{}", i), 1).await;
        }
        let head = h.queue.get(0).unwrap();
        h.status.set(PlayerState::Playing);

        for _ in 0..10 {
            h.queue.shuffle();
            assert_eq!(h.queue.get(0).unwrap().id, head.id);
        }
        assert_eq!(h.queue.len(), 30);
    }

    #[tokio::test]
    async fn sort_with_added_by_interleaves_round_robin() {
        let h = harness();
        for (name, by) in [("a1", 1), ("a2", 1), ("a3", 1), ("b1", 2), ("c1", 3), ("c2", 3)] {
            add(&h, &format!("https://a.test/{}", name), by).await;
        }

        h.queue.sort_with_added_by(None);

        let names: Vec<String> = urls(&h.queue)
            .iter()
            .map(|u| u.trim_start_matches("https://a.test/").to_string())
            .collect();
        assert_eq!(names, vec!["a1", "b1", "c1", "a2", "c2", "a3"]);
    }

    #[tokio::test]
    async fn sort_while_playing_keeps_head() {
        let h = harness();
        for (name, by) in [("b1", 2), ("a1", 1), ("a2", 1), ("b2", 2)] {
            add(&h, &format!("https://a.test/{}", name), by).await;
        }
        h.status.set(PlayerState::Playing);

        h.queue.sort_with_added_by(Some(vec![1, 2]));

        let names: Vec<String> = urls(&h.queue)
            .iter()
            .map(|u| u.trim_start_matches("https://a.test/").to_string())
            .collect();
        assert_eq!(names, vec!["b1", "a1", "b2", "a2"]);
    }

    #[tokio::test]
    async fn equal_playback_interleaves_on_insert() {
        let h = harness();
        h.settings.set_equal_playback(true);
        add(&h, "https://a.test/a1", 1).await;
        h.status.set(PlayerState::Playing);

        add(&h, "https://a.test/a2", 1).await;
        add(&h, "https://a.test/a3", 1).await;
        let added = add(&h, "https://a.test/b1", 2).await;

        assert_eq!(added.index, 1);
        assert_eq!(
            urls(&h.queue),
            vec!["https://a.test/a1", "https://a.test/b1", "https://a.test/a2", "https://a.test/a3"]
        );
    }

    #[tokio::test]
    async fn eta_sums_entries_before_index() {
        let h = harness();
        h.resolver.set_duration(300);
        add(&h, "https://a.test/A", 1).await;
        h.resolver.set_duration(200);
        add(&h, "https://a.test/B", 1).await;
        add(&h, "https://a.test/C", 1).await;

        assert_eq!(h.queue.eta(0, Duration::ZERO), None);
        assert_eq!(h.queue.eta(2, Duration::from_secs(100)), Some(Duration::from_secs(400)));
        assert_eq!(h.queue.length_seconds_to(1), 500);
        // Cabeza casi terminada: ya le toca
        assert_eq!(h.queue.eta(1, Duration::from_secs(301)), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn add_queue_reports_failure_instead_of_erroring() {
        let h = harness();
        let mut message = MockStatusMessage::new();
        message
            .expect_edit()
            .withf(|u| matches!(u, StatusUpdate::Loading))
            .times(1)
            .returning(|_| Ok(()));
        message
            .expect_edit()
            .withf(|u| matches!(u, StatusUpdate::AddFailed { .. }))
            .times(1)
            .returning(|_| Ok(()));

        let result = h
            .queue
            .add_queue(
                AddOptions::new("https://broken.test/x").added_by(user(1)),
                true,
                Duration::ZERO,
                Some(&message),
            )
            .await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ticket_expires_with_window_or_change() {
        let h = harness();
        let first = h
            .queue
            .add_queue(AddOptions::new("https://a.test/1").added_by(user(1)), true, Duration::ZERO, None)
            .await
            .unwrap();
        let ticket = first.cancel.clone().unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(h.queue.cancel_last_add(&ticket).is_err());

        let second = h
            .queue
            .add_queue(AddOptions::new("https://a.test/2").added_by(user(1)), true, Duration::ZERO, None)
            .await
            .unwrap();
        let ticket = second.cancel.clone().unwrap();
        let removed = h.queue.cancel_last_add(&ticket).unwrap();
        assert_eq!(removed.id, second.entry.id);
        assert_eq!(h.queue.len(), 1);

        let third = h
            .queue
            .add_queue(AddOptions::new("https://a.test/3").added_by(user(1)), true, Duration::ZERO, None)
            .await
            .unwrap();
        h.queue.remove_at(0).unwrap();
        assert!(h.queue.cancel_last_add(third.cancel.as_ref().unwrap()).is_err());
    }

    #[tokio::test]
    async fn playlist_cancellation_stops_at_iteration_boundary() {
        let h = harness();
        let cancellation = TaskCancellation::new();
        let items: Vec<String> = (0..10).map(|i| format!("https://a.test/p{}", i)).collect();
        let request = PlaylistRequest {
            title: "lista".into(),
            added_by: user(1),
            mode: InsertMode::Append,
            hint: SourceKind::Unknown,
        };

        let mut processed = 0;
        let token = cancellation.clone();
        let result = h
            .queue
            .process_playlist(
                &cancellation,
                request,
                items,
                |url| {
                    processed += 1;
                    if processed == 4 {
                        token.cancel();
                    }
                    let track = TrackSource::new(url.clone(), url, ServiceKind::Unknown);
                    async move { Ok(track) }
                },
                None,
            )
            .await;

        assert_eq!(result.outcome, PlaylistOutcome::Cancelled);
        assert_eq!(result.attempted, 4);
        assert_eq!(result.added.len(), 4);
        assert_eq!(h.queue.len(), 4);
    }

    #[tokio::test]
    async fn playlist_skips_failures_and_reports_progress() {
        let h = harness();
        let items: Vec<String> = (0..10)
            .map(|i| {
                if i == 3 {
                    "https://broken.test/3".to_string()
                } else {
                    format!("https://a.test/p{}", i)
                }
            })
            .collect();

        let mut message = MockStatusMessage::new();
        message
            .expect_edit()
            .withf(|u| matches!(u, StatusUpdate::PlaylistProgress { processed: 4, total: 10, .. }))
            .times(1)
            .returning(|_| Ok(()));
        message
            .expect_edit()
            .withf(|u| matches!(u, StatusUpdate::PlaylistProgress { processed: 8, total: 10, .. }))
            .times(1)
            .returning(|_| Ok(()));

        let result = h
            .queue
            .process_playlist(
                &TaskCancellation::new(),
                PlaylistRequest {
                    title: "lista".into(),
                    added_by: user(1),
                    mode: InsertMode::Append,
                    hint: SourceKind::Unknown,
                },
                items,
                |url| async move { Ok(TrackSource::new("t", url, ServiceKind::Unknown)) },
                Some(&message),
            )
            .await;

        assert_eq!(result.outcome, PlaylistOutcome::Completed);
        assert_eq!(result.added.len(), 9);
    }

    #[test]
    fn progress_frequency_decays_with_size() {
        assert!(should_report_progress(50, 500));
        assert!(!should_report_progress(10, 500));
        assert!(should_report_progress(10, 40));
        assert!(should_report_progress(4, 8));
        assert!(!should_report_progress(3, 8));
    }

    #[tokio::test]
    async fn mix_playlist_adds_seed_and_lookahead_then_disables() {
        let mix = FakeMix::new(vec![
            None,
            Some("https://www.youtube.com/watch?v=m1"),
            Some("https://www.youtube.com/watch?v=m2"),
        ]);
        let h = harness_with(QueueLimits::default(), mix);
        let mut events = h.queue.subscribe();

        h.queue
            .enable_mix_playlist("https://www.youtube.com/watch?v=seed", user(1), false)
            .await
            .unwrap();

        assert!(h.queue.mix_playlist_enabled());
        assert_eq!(
            urls(&h.queue),
            vec![
                "https://www.youtube.com/watch?v=seed",
                "https://www.youtube.com/watch?v=m1"
            ]
        );
        assert_eq!(
            events.recv().await.unwrap(),
            QueueEvent::MixPlaylistEnabledChanged(true)
        );

        h.queue.prepare_next_mix_item().await.unwrap();
        assert_eq!(h.queue.len(), 3);

        // Agotado
        h.queue.prepare_next_mix_item().await.unwrap();
        assert!(!h.queue.mix_playlist_enabled());
        assert_eq!(
            h.queue.prepare_next_mix_item().await.unwrap_err(),
            MusicError::MixPlaylistDisabled
        );
    }
}
