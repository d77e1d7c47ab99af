use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    notify::StatusUpdate,
    queue::{QueueEntry, QueuePage},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Simple Music Bot";

/// Entradas por página en `/queue`.
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Título, descripción y color de una actualización de estado.
pub(crate) fn status_parts(update: &StatusUpdate) -> (String, String, Colour) {
    match update {
        StatusUpdate::Loading => (
            "⏳ Cargando".to_string(),
            "Buscando información de la pista...".to_string(),
            colors::NEUTRAL_GRAY,
        ),
        StatusUpdate::TrackAdded { entry, index, eta, .. } => {
            let mut description = format!("**{}** se ha agregado a la cola", track_label(entry));
            description.push_str(&format!("\n📍 Posición: `{}`", index));
            if *index > 0 {
                description.push_str(&format!("\n⏱️ Sonará en: {}", format_eta(*eta)));
            }
            (
                "✅ Canción agregada".to_string(),
                description,
                colors::SUCCESS_GREEN,
            )
        }
        StatusUpdate::AddFailed { reason } => (
            "❌ No se pudo agregar".to_string(),
            reason.clone(),
            colors::ERROR_RED,
        ),
        StatusUpdate::PlaylistProgress {
            title,
            processed,
            total,
        } => (
            "📋 Cargando lista".to_string(),
            format!("{}\n{} / {} procesadas", title, processed, total),
            colors::INFO_BLUE,
        ),
        StatusUpdate::PlaylistFinished {
            title,
            added,
            total,
            cancelled,
        } => {
            let heading = if *cancelled {
                "🛑 Carga de lista cancelada"
            } else {
                "✅ Lista agregada"
            };
            (
                heading.to_string(),
                format!("{}\n{} de {} canciones agregadas", title, added, total),
                if *cancelled {
                    colors::WARNING_ORANGE
                } else {
                    colors::SUCCESS_GREEN
                },
            )
        }
        StatusUpdate::Preparing { title } => (
            "🔄 Preparando".to_string(),
            format!("**{}**", title),
            colors::NEUTRAL_GRAY,
        ),
        StatusUpdate::NowPlaying {
            entry,
            next,
            remaining,
        } => {
            let mut description = format!(
                "**{}**\n⏱️ {}",
                track_label(entry),
                track_length(entry)
            );
            if !entry.added_by.is_unknown() {
                description.push_str(&format!("\n👤 {}", entry.added_by.display_name));
            }
            if let Some(next) = next {
                description.push_str(&format!("\n⏭️ Siguiente: {}", next));
            }
            description.push_str(&format!("\n📋 Quedan {} en la cola", remaining));
            (
                "🎵 Reproduciendo ahora".to_string(),
                description,
                colors::MUSIC_PURPLE,
            )
        }
        StatusUpdate::PlaybackFailed { title, reason } => (
            "⚠️ Error de reproducción".to_string(),
            format!("**{}** no se pudo reproducir, saltando.\n`{}`", title, reason),
            colors::WARNING_ORANGE,
        ),
        StatusUpdate::QueueEmpty => (
            "👋 Cola terminada".to_string(),
            "No quedan canciones, saliendo del canal de voz.".to_string(),
            colors::NEUTRAL_GRAY,
        ),
    }
}

/// Convierte una actualización de estado en un embed.
pub fn status_embed(update: &StatusUpdate) -> CreateEmbed {
    let (title, description, colour) = status_parts(update);
    let mut embed = CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colour)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now());

    let entry = match update {
        StatusUpdate::TrackAdded { entry, .. } | StatusUpdate::NowPlaying { entry, .. } => {
            Some(entry)
        }
        _ => None,
    };
    if let Some(entry) = entry.filter(|e| !e.basic_info.private) {
        if let Some(thumbnail) = &entry.basic_info.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }
        embed = embed.url(entry.url());
    }

    embed
}

/// Datos que muestra `/queue`.
#[derive(Debug, Clone)]
pub struct QueueView {
    pub page: QueuePage,
    pub total: usize,
    /// `None` si hay directos o duraciones desconocidas.
    pub length: Option<u64>,
    /// Duración conocida, sin contar directos.
    pub known_length: u64,
    pub loop_enabled: bool,
    pub queue_loop_enabled: bool,
    pub mix_enabled: bool,
}

pub(crate) fn queue_lines(page: &QueuePage) -> String {
    page.entries
        .iter()
        .map(|(index, entry)| {
            let marker = if *index == 0 {
                "▶️".to_string()
            } else {
                format!("**{}**.", index)
            };
            format!("{} {} `[{}]`", marker, track_label(entry), track_length(entry))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Crea un embed para mostrar la cola de reproducción
pub fn queue_embed(view: &QueueView) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if view.page.entries.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut info = format!("**Total:** {} canciones", view.total);
    match view.length {
        Some(seconds) => info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(Duration::from_secs(seconds))
        )),
        None if view.known_length > 0 => info.push_str(&format!(
            " • **Duración:** más de {} 🔴",
            format_duration(Duration::from_secs(view.known_length))
        )),
        None => info.push_str(" • **Duración:** 🔴 indeterminada"),
    }
    if view.loop_enabled {
        info.push_str(" • 🔂");
    }
    if view.queue_loop_enabled {
        info.push_str(" • 🔁");
    }
    if view.mix_enabled {
        info.push_str(" • 🎛️ Mix");
    }

    embed
        .description(queue_lines(&view.page))
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Simple Music Bot",
            view.page.page + 1,
            view.page.total_pages
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn track_label(entry: &QueueEntry) -> String {
    if entry.basic_info.private {
        "🔒 Pista privada".to_string()
    } else {
        entry.title().to_string()
    }
}

fn track_length(entry: &QueueEntry) -> String {
    if entry.basic_info.is_live() {
        "🔴 En vivo".to_string()
    } else if entry.basic_info.duration_seconds == 0 {
        "?".to_string()
    } else {
        format_duration(Duration::from_secs(entry.basic_info.duration_seconds))
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => format_duration(eta),
        None => "desconocido".to_string(),
    }
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
