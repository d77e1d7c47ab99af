use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Estado del reproductor de un servidor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerState {
    Idle = 0,
    Preparing = 1,
    Playing = 2,
    Paused = 3,
}

impl PlayerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayerState::Preparing,
            2 => PlayerState::Playing,
            3 => PlayerState::Paused,
            _ => PlayerState::Idle,
        }
    }
}

/// Estado de reproducción compartido entre la cola y el reproductor.
///
/// Solo el reproductor escribe; la cola lo lee para proteger la cabeza.
#[derive(Debug)]
pub struct PlaybackStatus {
    state: AtomicU8,
    last_error: Mutex<Option<String>>,
}

impl PlaybackStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PlayerState::Idle as u8),
            last_error: Mutex::new(None),
        }
    }

    pub fn get(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: PlayerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Pasa de `from` a `to` solo si el estado actual es `from`.
    pub fn transition(&self, from: PlayerState, to: PlayerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Playing o Paused: hay un stream activo.
    pub fn is_playing(&self) -> bool {
        matches!(self.get(), PlayerState::Playing | PlayerState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.get() == PlayerState::Paused
    }

    pub fn is_preparing(&self) -> bool {
        self.get() == PlayerState::Preparing
    }

    pub fn record_error(&self, error: impl Into<String>) {
        *self.last_error.lock() = Some(error.into());
    }

    pub fn reset_error(&self) {
        *self.last_error.lock() = None;
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Preferencias de un servidor que leen varios componentes.
#[derive(Debug, Default)]
pub struct GuildSettings {
    add_related: AtomicBool,
    equal_playback: AtomicBool,
    // 0 = sin canal vinculado
    bound_channel: AtomicU64,
}

impl GuildSettings {
    pub fn new(bound_channel: u64) -> Self {
        Self {
            bound_channel: AtomicU64::new(bound_channel),
            ..Default::default()
        }
    }

    pub fn add_related(&self) -> bool {
        self.add_related.load(Ordering::SeqCst)
    }

    pub fn set_add_related(&self, value: bool) {
        self.add_related.store(value, Ordering::SeqCst);
    }

    pub fn equal_playback(&self) -> bool {
        self.equal_playback.load(Ordering::SeqCst)
    }

    pub fn set_equal_playback(&self, value: bool) {
        self.equal_playback.store(value, Ordering::SeqCst);
    }

    pub fn bound_channel(&self) -> Option<u64> {
        match self.bound_channel.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn set_bound_channel(&self, channel_id: u64) {
        self.bound_channel.store(channel_id, Ordering::SeqCst);
    }
}
