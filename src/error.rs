use thiserror::Error;

/// Errores del núcleo de cola y reproducción.
///
/// Los fallos de stream se recuperan localmente en [`crate::audio::player`];
/// el resto se propaga al llamador inmediato.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MusicError {
    /// The source could not be resolved to a playable descriptor.
    #[error("No se pudo resolver la fuente: {0}")]
    Resolution(String),

    /// Structural misuse, e.g. removing the track that is playing.
    #[error("Operación inválida: {0}")]
    InvalidOperation(String),

    /// Mid-playback failure of the audio stream.
    #[error("Fallo en el stream de audio: {0}")]
    StreamFailure(String),

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("No hay conexión de voz activa")]
    NotConnected,

    #[error("Error al unirse al canal de voz: {0}")]
    Join(String),

    #[error("Versión de copia incompatible (actual: v{expected}; archivo: v{found})")]
    UnsupportedBackupVersion { expected: u32, found: u32 },

    #[error("La lista mix no está activada")]
    MixPlaylistDisabled,
}

pub type MusicResult<T> = Result<T, MusicError>;

impl MusicError {
    pub fn resolution(err: impl std::fmt::Display) -> Self {
        Self::Resolution(err.to_string())
    }

    pub fn stream(err: impl std::fmt::Display) -> Self {
        Self::StreamFailure(err.to_string())
    }
}
