//! # Bot Module
//!
//! Discord surface of the bot.
//!
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - Status delivery to Discord ([`notifier`])
//! - Voice state tracking: the session leaves when the bot is forced out of
//!   its channel or left alone while playing
//! - Background maintenance: cache sweeps and periodic backups
//!
//! All guild state lives in the [`SessionRegistry`]; this layer only
//! converts serenity ids and renders replies.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{
    audio::queue::CancelLastAdd, cache::MusicCache, config::Config, session::SessionRegistry,
    storage::BackupStorage,
};

/// Manejador de eventos de Discord.
pub struct MusicBot {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    storage: Arc<BackupStorage>,
    cache: MusicCache,
    /// Permisos de "cancelar añadido" pendientes, por id de entrada.
    cancel_tickets: DashMap<u64, (u64, CancelLastAdd)>,
    started: AtomicBool,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        storage: Arc<BackupStorage>,
        cache: MusicCache,
    ) -> Self {
        Self {
            config,
            registry,
            storage,
            cache,
            cancel_tickets: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<BackupStorage> {
        &self.storage
    }

    pub fn remember_cancel(&self, guild_id: u64, ticket: CancelLastAdd) {
        self.cancel_tickets
            .insert(ticket.entry_id(), (guild_id, ticket));
    }

    /// Retira el permiso de cancelar asociado a la entrada.
    pub fn take_cancel(&self, entry_id: u64) -> Option<(u64, CancelLastAdd)> {
        self.cancel_tickets.remove(&entry_id).map(|(_, v)| v)
    }

    fn sweep_cancel_tickets(&self) {
        self.cancel_tickets
            .retain(|_, (_, ticket)| !ticket.is_expired());
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, GuildId::new(guild_id)).await?;
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
            }
        }

        info!("✅ Comandos registrados");
        Ok(())
    }

    /// Decide si la sesión debe salir tras un cambio de voz.
    ///
    /// Devuelve la guild de la que salir si echaron al bot del canal, o si
    /// está reproduciendo y no queda nadie más en su canal.
    fn should_leave(&self, ctx: &Context, old: Option<&VoiceState>, new: &VoiceState) -> Option<u64> {
        let guild_id = new.guild_id?;
        let session = self.registry.get(guild_id.get())?;
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            if old.is_some() && new.channel_id.is_none() && session.player().is_connected() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                return Some(guild_id.get());
            }
            return None;
        }

        let channel = session.player().channel_id()?;
        if !session.player().is_playing() {
            return None;
        }

        let listeners = {
            let guild = ctx.cache.guild(guild_id)?;
            guild
                .voice_states
                .values()
                .filter(|state| state.user_id != bot_id)
                .filter(|state| state.channel_id.map(|c| c.get()) == Some(channel))
                .count()
        };

        if listeners == 0 {
            info!("🚪 Bot solo en el canal de guild {}, saliendo", guild_id);
            return Some(guild_id.get());
        }
        None
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // Ready puede repetirse tras una reconexión
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.storage.restore_all(&self.registry).await {
            warn!("⚠️ No se pudieron restaurar las sesiones: {:?}", e);
        }

        tokio::spawn(maintenance_tasks(
            self.config.clone(),
            self.cache.clone(),
            self.registry.clone(),
            self.storage.clone(),
        ));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        self.sweep_cancel_tickets();

        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = self.should_leave(&ctx, old.as_ref(), &new) else {
            return;
        };

        if let Some(session) = self.registry.get(guild_id) {
            session.leave().await;
        }
    }
}

/// Tareas periódicas: limpieza de caché y copias de seguridad.
async fn maintenance_tasks(
    config: Arc<Config>,
    cache: MusicCache,
    registry: Arc<SessionRegistry>,
    storage: Arc<BackupStorage>,
) {
    let mut backup = tokio::time::interval(Duration::from_secs(config.backup_interval));
    let mut cleanup = tokio::time::interval(Duration::from_secs(3600)); // Cada hora

    loop {
        tokio::select! {
            _ = backup.tick() => {
                storage.backup_all(&registry).await;
            }
            _ = cleanup.tick() => {
                cache.cleanup_old_entries();
                info!("🧹 Tareas de mantenimiento completadas");
            }
        }
    }
}
