use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ChannelId, CommandInteraction, Http},
    builder::{CreateMessage, EditInteractionResponse},
};
use std::sync::Arc;

use crate::{
    audio::notify::{ChannelNotifier, StatusMessage, StatusUpdate},
    ui::{buttons, embeds},
};

/// Envía los avisos del reproductor al canal vinculado.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelNotifier for DiscordNotifier {
    async fn send(&self, channel_id: u64, update: StatusUpdate) -> Result<()> {
        if channel_id == 0 {
            anyhow::bail!("Canal vinculado inválido");
        }

        ChannelId::new(channel_id)
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::status_embed(&update)),
            )
            .await?;
        Ok(())
    }
}

/// Respuesta diferida de un comando, editada a medida que avanza la operación.
pub struct InteractionStatus {
    http: Arc<Http>,
    interaction: CommandInteraction,
}

impl InteractionStatus {
    pub fn new(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self { http, interaction }
    }
}

#[async_trait]
impl StatusMessage for InteractionStatus {
    async fn edit(&self, update: StatusUpdate) -> Result<()> {
        let components = match &update {
            StatusUpdate::TrackAdded {
                entry,
                cancellable: true,
                ..
            } => vec![buttons::cancel_last_add_row(entry.id)],
            _ => vec![],
        };

        let builder = EditInteractionResponse::new()
            .embed(embeds::status_embed(&update))
            .components(components);

        self.interaction.edit_response(&self.http, builder).await?;
        Ok(())
    }
}
