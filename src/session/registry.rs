use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::{GuildSession, SessionDeps};

/// Sesiones vivas, por guild.
pub struct SessionRegistry {
    sessions: DashMap<u64, Arc<GuildSession>>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// Devuelve la sesión del servidor, creándola si no existe.
    pub fn get_or_create(&self, guild_id: u64, bound_channel: u64) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| GuildSession::new(guild_id, bound_channel, &self.deps))
            .clone()
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Desconecta la sesión y la sustituye por una nueva.
    pub async fn reset(&self, guild_id: u64) -> Arc<GuildSession> {
        let previous = self.sessions.remove(&guild_id).map(|(_, session)| session);

        let bound_channel = match previous {
            Some(session) => {
                session.cancel_all();
                if session.player().is_connected() {
                    session.player().disconnect().await;
                }
                session.settings().bound_channel().unwrap_or(0)
            }
            None => 0,
        };

        info!("🔄 Sesión de guild {} reiniciada", guild_id);
        self.get_or_create(guild_id, bound_channel)
    }

    pub fn sessions(&self) -> Vec<Arc<GuildSession>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
