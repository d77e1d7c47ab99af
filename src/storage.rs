use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, warn};

use crate::session::{parse_status, QueueDocument, SessionRegistry};

/// Copia de seguridad de un servidor, guardada en JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildBackup {
    pub guild_id: u64,
    /// Cadena de estado `voz:canal:loop:queueLoop:related:equal`.
    pub status: String,
    pub queue: QueueDocument,
    pub saved_at: DateTime<Utc>,
}

/// Almacén de copias basado en archivos JSON
pub struct BackupStorage {
    data_dir: PathBuf,
}

impl BackupStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(data_dir.join("guilds")).await?;
        info!("📁 Storage inicializado en: {}", data_dir.display());
        Ok(Self { data_dir })
    }

    fn guild_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir
            .join("guilds")
            .join(format!("guild_{}.json", guild_id))
    }

    /// Guarda la copia; escribe a un temporal y lo renombra.
    pub async fn save(&self, backup: &GuildBackup) -> Result<()> {
        let path = self.guild_file_path(backup.guild_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(backup)?;

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn load(&self, guild_id: u64) -> Result<Option<GuildBackup>> {
        let path = self.guild_file_path(guild_id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Carga todas las copias; los archivos corruptos se omiten.
    pub async fn load_all(&self) -> Result<Vec<GuildBackup>> {
        let mut files = fs::read_dir(self.data_dir.join("guilds")).await?;
        let mut backups = Vec::new();

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            let Some(guild_id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };

            match self.load(guild_id).await {
                Ok(Some(backup)) => backups.push(backup),
                Ok(None) => {}
                Err(e) => warn!("Error cargando la copia de guild {}: {}", guild_id, e),
            }
        }

        Ok(backups)
    }

    /// Borra la copia de la guild, si existe.
    pub async fn remove(&self, guild_id: u64) -> Result<()> {
        let path = self.guild_file_path(guild_id);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            info!("🗑️ Copia eliminada para guild {}", guild_id);
        }
        Ok(())
    }

    /// Guarda todas las sesiones vivas. Devuelve cuántas se guardaron.
    pub async fn backup_all(&self, registry: &SessionRegistry) -> usize {
        let mut saved = 0;

        for session in registry.sessions() {
            let backup = GuildBackup {
                guild_id: session.guild_id(),
                status: session.export_status(),
                queue: session.export_queue(),
                saved_at: Utc::now(),
            };

            match self.save(&backup).await {
                Ok(()) => saved += 1,
                Err(e) => error!("❌ Error guardando guild {}: {}", backup.guild_id, e),
            }
        }

        if saved > 0 {
            info!("💾 {} sesiones guardadas", saved);
        }
        saved
    }

    /// Restaura las sesiones guardadas: primero la cola, luego el estado.
    pub async fn restore_all(&self, registry: &SessionRegistry) -> Result<usize> {
        let backups = self.load_all().await?;
        let mut restored = 0;

        for backup in backups {
            let status = match parse_status(&backup.status) {
                Ok(status) => status,
                Err(e) => {
                    warn!("⚠️ Estado inválido para guild {}: {}", backup.guild_id, e);
                    continue;
                }
            };

            let session = registry.get_or_create(backup.guild_id, status.bound_channel);
            if let Err(e) = session.import_queue(backup.queue).await {
                warn!("⚠️ Cola no restaurada para guild {}: {}", backup.guild_id, e);
                continue;
            }
            if let Err(e) = session.import_status(&status).await {
                warn!("⚠️ Estado no restaurado para guild {}: {}", backup.guild_id, e);
            }
            restored += 1;
        }

        if restored > 0 {
            info!("📂 Restauradas {} sesiones", restored);
        }
        Ok(restored)
    }
}
