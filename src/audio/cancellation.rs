use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Token de cancelación cooperativa para operaciones en lote.
///
/// Nunca interrumpe nada por sí mismo: el bucle dueño consulta
/// [`TaskCancellation::is_cancelled`] entre iteraciones. Las esperas sueltas
/// (leer una lista) pueden vigilar [`TaskCancellation::cancelled`].
#[derive(Clone, Debug)]
pub struct TaskCancellation {
    inner: Arc<TokenInner>,
}

#[derive(Debug)]
struct TokenInner {
    id: u64,
    cancelled: AtomicBool,
    token: CancellationToken,
}

impl TaskCancellation {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
                cancelled: AtomicBool::new(false),
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Marca el token como cancelado. Devuelve `true` solo si no lo estaba.
    pub fn cancel(&self) -> bool {
        let flipped = !self.inner.cancelled.swap(true, Ordering::SeqCst);
        if flipped {
            self.inner.token.cancel();
        }
        flipped
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Espera hasta que alguien cancele el token.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

impl Default for TaskCancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Conjunto de tokens vivos de una sesión.
#[derive(Debug, Default)]
pub struct CancellationSet {
    tokens: Mutex<HashMap<u64, TaskCancellation>>,
}

impl CancellationSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registra el token; se desregistra al soltar el guard.
    pub fn bind(self: &Arc<Self>, token: &TaskCancellation) -> CancellationBinding {
        self.tokens.lock().insert(token.id(), token.clone());
        debug!("🔗 Token {} vinculado", token.id());
        CancellationBinding {
            set: Arc::downgrade(self),
            id: token.id(),
        }
    }

    pub fn unbind(&self, token: &TaskCancellation) {
        self.unbind_id(token.id());
    }

    fn unbind_id(&self, id: u64) {
        if self.tokens.lock().remove(&id).is_some() {
            debug!("🔓 Token {} desvinculado", id);
        }
    }

    /// Cancela todos los tokens vinculados.
    ///
    /// Devuelve `true` si al menos uno no estaba cancelado ya.
    pub fn cancel_all(&self) -> bool {
        let tokens: Vec<TaskCancellation> = self.tokens.lock().values().cloned().collect();
        tokens
            .iter()
            .map(|token| token.cancel())
            .fold(false, |any, flipped| any || flipped)
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard RAII de una vinculación.
#[derive(Debug)]
pub struct CancellationBinding {
    set: Weak<CancellationSet>,
    id: u64,
}

impl Drop for CancellationBinding {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.unbind_id(self.id);
        }
    }
}
