use anyhow::Result;
use serenity::{
    builder::{
        CreateAttachment, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{commands::parse_positions, notifier::InteractionStatus, MusicBot};
use crate::{
    audio::queue::AddedBy,
    session::{GuildSession, PlayOutcome, PlayRequest},
    ui::{
        buttons::{self, ButtonAction},
        embeds::{self, QueueView, QUEUE_PAGE_SIZE},
    },
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let session = bot
        .registry()
        .get_or_create(guild_id.get(), command.channel_id.get());

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, &session).await?,
        "pause" => {
            let message = if session.player().pause() {
                "⏸️ Reproducción pausada"
            } else {
                "❌ No hay nada reproduciéndose"
            };
            reply(ctx, &command, message).await?;
        }
        "resume" => {
            let message = if session.player().resume() {
                "▶️ Reproducción reanudada"
            } else {
                "❌ La reproducción no está pausada"
            };
            reply(ctx, &command, message).await?;
        }
        "skip" => {
            if !session.player().is_connected() {
                return reply_error(ctx, &command, "No estoy en un canal de voz").await;
            }
            reply(ctx, &command, "⏭️ Saltando canción").await?;
            session.skip().await;
        }
        "stop" => {
            session.cancel_all();
            session.player().stop();
            reply(ctx, &command, "⏹️ Reproducción detenida").await?;
        }
        "rewind" => {
            if session.queue().is_empty() {
                return reply_error(ctx, &command, "La cola está vacía").await;
            }
            reply(ctx, &command, "⏮️ Volviendo al principio").await?;
            session.player().rewind().await;
        }
        "join" => handle_join(ctx, &command, &session).await?,
        "leave" => {
            session.leave().await;
            reply(ctx, &command, "👋 Desconectado del canal de voz").await?;
        }
        "queue" => {
            let page = int_option(&command, "page").unwrap_or(1).max(1) as usize - 1;
            let view = queue_view(&session, page);
            let mut message = CreateInteractionResponseMessage::new().embed(embeds::queue_embed(&view));
            if view.page.total_pages > 1 {
                message = message.components(vec![buttons::queue_navigation_row(
                    view.page.page,
                    view.page.total_pages,
                )]);
            }
            command
                .create_response(&ctx.http, CreateInteractionResponse::Message(message))
                .await?;
        }
        "remove" => handle_remove(ctx, &command, &session).await?,
        "move" => {
            let from = int_option(&command, "from").unwrap_or(0) as usize;
            let to = int_option(&command, "to").unwrap_or(0) as usize;
            match session.queue().move_entry(from, to) {
                Ok(()) => reply(ctx, &command, format!("↕️ Movida de {} a {}", from, to)).await?,
                Err(e) => reply_error(ctx, &command, &e.to_string()).await?,
            }
        }
        "shuffle" => {
            session.queue().shuffle();
            reply(ctx, &command, "🔀 Cola mezclada").await?;
        }
        "clear" => {
            if bool_option(&command, "all").unwrap_or(false) {
                session.cancel_all();
                session.player().stop();
                session.queue().remove_all();
            } else {
                session.queue().remove_from_2nd();
            }
            reply(ctx, &command, "🧹 Cola vaciada").await?;
        }
        "end" => {
            let queue = session.queue();
            queue.set_loop_enabled(false);
            queue.set_queue_loop_enabled(false);
            queue.set_once_loop_enabled(false);
            session.settings().set_add_related(false);
            queue.disable_mix_playlist().await;
            queue.remove_from_2nd();
            reply(ctx, &command, "🏁 Terminaré al acabar la canción actual").await?;
        }
        "loop" => {
            let enabled = !session.queue().loop_enabled();
            session.queue().set_loop_enabled(enabled);
            reply(ctx, &command, toggle_message("🔂 Repetir canción", enabled)).await?;
        }
        "queueloop" => {
            let enabled = !session.queue().queue_loop_enabled();
            session.queue().set_queue_loop_enabled(enabled);
            reply(ctx, &command, toggle_message("🔁 Repetir cola", enabled)).await?;
        }
        "onceloop" => {
            let enabled = !session.queue().once_loop_enabled();
            session.queue().set_once_loop_enabled(enabled);
            reply(ctx, &command, toggle_message("🔂 Repetir una vez", enabled)).await?;
        }
        "related" => {
            let enabled = !session.settings().add_related();
            session.settings().set_add_related(enabled);
            reply(ctx, &command, toggle_message("🔗 Relacionados", enabled)).await?;
        }
        "equal" => {
            let enabled = !session.settings().equal_playback();
            session.settings().set_equal_playback(enabled);
            if enabled {
                session.queue().sort_with_added_by(None);
            }
            reply(ctx, &command, toggle_message("⚖️ Reparto equitativo", enabled)).await?;
        }
        "mix" => handle_mix(ctx, &command, &session).await?,
        "volume" => match int_option(&command, "level") {
            Some(level) => {
                let level = level.clamp(0, 200) as u8;
                session.player().set_volume(level);
                reply(ctx, &command, format!("🔊 Volumen ajustado a {}%", level)).await?;
            }
            None => {
                let current = session.player().volume();
                reply(ctx, &command, format!("🔊 Volumen actual: {}%", current)).await?;
            }
        },
        "cancel" => {
            let message = if session.cancel_all() {
                "🛑 Cargas en curso canceladas"
            } else {
                "ℹ️ No había nada que cancelar"
            };
            reply(ctx, &command, message).await?;
        }
        "reset" => {
            bot.registry().reset(guild_id.get()).await;
            if let Err(e) = bot.storage().remove(guild_id.get()).await {
                warn!("⚠️ No se pudo borrar la copia de guild {}: {:?}", guild_id, e);
            }
            reply(ctx, &command, "🔄 Reproductor reiniciado").await?;
        }
        "export" => {
            let document = session.export_queue();
            let json = serde_json::to_vec_pretty(&document)?;
            let attachment = CreateAttachment::bytes(json, format!("queue_{}.json", guild_id));
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content(format!(
                                "📤 {} canciones exportadas • estado `{}`",
                                document.data.len(),
                                session.export_status()
                            ))
                            .add_file(attachment),
                    ),
                )
                .await?;
        }
        _ => reply_error(ctx, &command, "Comando no reconocido").await?,
    }

    Ok(())
}

/// Maneja interacciones con componentes (botones)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(session) = bot.registry().get(guild_id.get()) else {
        return component_error(ctx, &component, "No hay ninguna sesión activa").await;
    };

    match buttons::parse_custom_id(&component.data.custom_id) {
        Some(ButtonAction::CancelLastAdd(entry_id)) => {
            let ticket = bot
                .take_cancel(entry_id)
                .filter(|(guild, _)| *guild == guild_id.get())
                .map(|(_, ticket)| ticket);
            let Some(ticket) = ticket else {
                return component_error(ctx, &component, "El botón de cancelar ya no es válido")
                    .await;
            };

            match session.queue().cancel_last_add(&ticket) {
                Ok(entry) => {
                    component
                        .create_response(
                            &ctx.http,
                            CreateInteractionResponse::UpdateMessage(
                                CreateInteractionResponseMessage::new()
                                    .embed(embeds::success_embed(
                                        "Añadido cancelado",
                                        &format!("**{}** se quitó de la cola", entry.title()),
                                    ))
                                    .components(vec![]),
                            ),
                        )
                        .await?;
                }
                Err(e) => component_error(ctx, &component, &e.to_string()).await?,
            }
        }
        Some(ButtonAction::QueuePage(page)) => {
            let view = queue_view(&session, page);
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::queue_embed(&view))
                            .components(vec![buttons::queue_navigation_row(
                                view.page.page,
                                view.page.total_pages,
                            )]),
                    ),
                )
                .await?;
        }
        None => component_error(ctx, &component, "Acción no reconocida").await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    session: &Arc<GuildSession>,
) -> Result<()> {
    let guild_id = session.guild_id();
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Búsqueda no proporcionada"))?
        .trim()
        .to_string();

    if query.is_empty() {
        return reply_error(ctx, command, "Indica una URL o qué buscar").await;
    }

    let Ok(voice_channel) = get_user_voice_channel(ctx, GuildId::new(guild_id), command.user.id)
    else {
        return reply_error(ctx, command, "Debes estar en un canal de voz").await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    session.settings().set_bound_channel(command.channel_id.get());
    if let Err(e) = session.join(voice_channel.get()).await {
        warn!("⚠️ No se pudo entrar al canal de voz en guild {}: {}", guild_id, e);
        return edit_error(ctx, command, "No pude entrar a tu canal de voz").await;
    }

    let request = PlayRequest {
        url: query,
        added_by: requester(command),
        first: bool_option(command, "first").unwrap_or(false),
        cancellable: true,
        private: bool_option(command, "private").unwrap_or(false),
    };
    let status = InteractionStatus::new(ctx.http.clone(), command.clone());

    if let PlayOutcome::Track(added) = session.play_from_url(request, Some(&status)).await {
        if let Some(ticket) = added.cancel {
            bot.remember_cancel(guild_id, ticket);
        }
    }

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    session: &Arc<GuildSession>,
) -> Result<()> {
    let guild_id = GuildId::new(session.guild_id());
    let Ok(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_error(ctx, command, "Debes estar en un canal de voz").await;
    };

    session.settings().set_bound_channel(command.channel_id.get());
    match session.join(voice_channel.get()).await {
        Ok(()) => reply(ctx, command, "🔊 Conectado al canal de voz").await,
        Err(e) => reply_error(ctx, command, &e.to_string()).await,
    }
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    session: &Arc<GuildSession>,
) -> Result<()> {
    let positions = string_option(command, "positions").unwrap_or_default();
    let snapshot = session.queue().snapshot();

    let Some(indices) = parse_positions(positions, snapshot.len()) else {
        return reply_error(ctx, command, "Posiciones no válidas").await;
    };

    let ids: Vec<u64> = indices.iter().map(|&i| snapshot[i].id).collect();
    let removed = session.queue().remove_if(|entry| ids.contains(&entry.id));

    if removed.is_empty() {
        return reply_error(ctx, command, "No se puede quitar la canción que está sonando").await;
    }
    reply(ctx, command, format!("🗑️ {} canciones quitadas", removed.len())).await
}

async fn handle_mix(
    ctx: &Context,
    command: &CommandInteraction,
    session: &Arc<GuildSession>,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let url = string_option(command, "url").map(str::trim);
    match session.start_mix(url, requester(command)).await {
        Ok(()) => {
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .embed(embeds::success_embed("Mix activado", "La cola seguirá sola 🎛️")),
                )
                .await?;
            Ok(())
        }
        Err(e) => edit_error(ctx, command, &e.to_string()).await,
    }
}

// Funciones auxiliares

fn queue_view(session: &GuildSession, page: usize) -> QueueView {
    let queue = session.queue();
    QueueView {
        page: queue.get_page(page, QUEUE_PAGE_SIZE),
        total: queue.public_len(),
        length: queue.length_seconds(),
        known_length: queue.length_seconds_actual(),
        loop_enabled: queue.loop_enabled(),
        queue_loop_enabled: queue.queue_loop_enabled(),
        mix_enabled: queue.mix_playlist_enabled(),
    }
}

fn requester(command: &CommandInteraction) -> AddedBy {
    let name = command
        .member
        .as_ref()
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| command.user.name.clone());
    AddedBy::new(command.user.id.get(), name)
}

fn toggle_message(label: &str, enabled: bool) -> String {
    format!("{}: {}", label, if enabled { "activado" } else { "desactivado" })
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(error_embed(message))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn edit_error(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(error_embed(message)))
        .await?;
    Ok(())
}

async fn component_error(
    ctx: &Context,
    component: &ComponentInteraction,
    message: &str,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(error_embed(message))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

fn error_embed(message: &str) -> CreateEmbed {
    embeds::error_embed("Error", message)
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
