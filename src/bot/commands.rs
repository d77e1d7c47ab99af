use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        simple("pause", "Pausa la reproducción actual"),
        simple("resume", "Reanuda la reproducción pausada"),
        simple("skip", "Salta a la siguiente canción"),
        simple("stop", "Detiene la reproducción sin vaciar la cola"),
        simple("rewind", "Vuelve a empezar la canción actual"),
        simple("join", "Conecta el bot a tu canal de voz"),
        simple("leave", "Desconecta el bot del canal de voz"),
        queue_command(),
        remove_command(),
        move_command(),
        simple("shuffle", "Mezcla la cola"),
        clear_command(),
        simple("end", "Termina al acabar la canción actual"),
        simple("loop", "Activa/desactiva la repetición de la canción"),
        simple("queueloop", "Activa/desactiva la repetición de la cola"),
        simple("onceloop", "Repite la canción actual una vez más"),
        simple("related", "Activa/desactiva el añadido de relacionados"),
        simple("equal", "Activa/desactiva el reparto equitativo por usuario"),
        mix_command(),
        volume_command(),
        simple("cancel", "Cancela las cargas de listas en curso"),
        simple("reset", "Reinicia el reproductor del servidor"),
        simple("export", "Exporta la cola a un archivo"),
    ]
}

fn simple(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description)
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL de la canción o lista, o palabras clave",
            )
            .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "first",
            "Añadir al principio de la cola",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "private",
            "Ocultar la canción en listados y copias",
        ))
}

fn mix_command() -> CreateCommand {
    CreateCommand::new("mix")
        .description("Continúa la cola con un mix de YouTube")
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "url",
            "Vídeo semilla (por defecto, la canción actual)",
        ))
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear")
        .description("Vacía la cola salvo la canción actual")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "all",
            "Quitar también la canción actual",
        ))
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita canciones de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "positions",
                "Posiciones: 3, 2-5, 4-, -6 o 1,3,5",
            )
            .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción de posición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(0)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(0)
                .required(true),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-200)",
            )
            .min_int_value(0)
            .max_int_value(200),
        )
}

/// Interpreta una lista de posiciones de la cola.
///
/// Admite posiciones sueltas y rangos separados por comas: `3`, `2-5`,
/// `4-` (hasta el final) y `-6` (desde la posición 1). La posición 0 es la
/// canción actual y solo entra si se nombra. Devuelve los índices ordenados
/// y sin repetir, o `None` si alguna parte es inválida o está fuera de rango.
pub fn parse_positions(positions: &str, len: usize) -> Option<Vec<usize>> {
    if len == 0 {
        return None;
    }

    let mut indices = Vec::new();

    for part in positions.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => {
                let start = match start.trim() {
                    "" => 1,
                    s => s.parse().ok()?,
                };
                let end = match end.trim() {
                    "" => len - 1,
                    e => e.parse().ok()?,
                };
                (start, end)
            }
            None => {
                let index = part.parse().ok()?;
                (index, index)
            }
        };

        if start > end || end >= len {
            return None;
        }
        indices.extend(start..=end);
    }

    if indices.is_empty() {
        return None;
    }

    indices.sort_unstable();
    indices.dedup();
    Some(indices)
}
