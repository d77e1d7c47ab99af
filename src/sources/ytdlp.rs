use anyhow::{Context, Result};
use async_process::Command;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{ServiceKind, TrackSource};

/// Invocador compartido de yt-dlp
#[derive(Clone)]
pub struct YtDlp {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Arc<Semaphore>,
    geo_country: Option<String>,
}

/// Información extraída con `--dump-json`
#[derive(Debug, Deserialize)]
pub struct YtDlpInfo {
    pub id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub webpage_url: String,
    pub is_live: Option<bool>,
}

/// Entrada de `--flat-playlist`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FlatEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub duration: Option<f64>,
}

impl YtDlpInfo {
    pub fn into_track(self, service: ServiceKind) -> TrackSource {
        let service = match service {
            ServiceKind::YouTube { related, .. } => ServiceKind::YouTube {
                is_live: self.is_live.unwrap_or(false),
                related,
            },
            other => other,
        };

        let mut track = TrackSource::new(self.title, self.webpage_url, service)
            .with_duration(self.duration.map(|d| d.round() as u64).unwrap_or(0));

        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }

        track
    }
}

impl FlatEntry {
    /// URL navegable; YouTube a veces solo devuelve el id.
    pub fn page_url(&self, service: &ServiceKind) -> Option<String> {
        match (&self.url, &self.id, service) {
            (Some(url), _, _) if url.starts_with("http") => Some(url.clone()),
            (_, Some(id), ServiceKind::YouTube { .. }) => {
                Some(format!("https://www.youtube.com/watch?v={}", id))
            }
            (Some(url), _, _) => Some(url.clone()),
            _ => None,
        }
    }

    /// Descriptor conocido; `None` si la entrada no tiene URL.
    pub fn into_track(self, service: ServiceKind) -> Option<TrackSource> {
        let url = self.page_url(&service)?;
        let title = self.title.unwrap_or_else(|| url.clone());
        Some(
            TrackSource::new(title, url, service)
                .with_duration(self.duration.map(|d| d.round() as u64).unwrap_or(0)),
        )
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self {
            rate_limiter: Arc::new(Semaphore::new(3)),
            geo_country: None,
        }
    }

    /// Comparte el límite de procesos pero fija la región de las peticiones.
    pub fn with_region(&self, country: &str) -> Self {
        Self {
            rate_limiter: self.rate_limiter.clone(),
            geo_country: Some(country.to_string()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("yt-dlp");
        if let Some(country) = &self.geo_country {
            cmd.args(["--geo-bypass-country", country.as_str()]);
        }
        cmd
    }

    /// Obtiene información de una URL específica
    pub async fn dump_json(&self, url: &str) -> Result<YtDlpInfo> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("📊 Obteniendo info de: {}", url);

        let output = self
            .command()
            .args(["--no-playlist", "--dump-json", "--no-warnings", url])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")
    }

    /// Enumera una lista sin resolver cada elemento (`start` y `end` desde 1, inclusivos)
    pub async fn flat_playlist(&self, url: &str, start: usize, end: usize) -> Result<Vec<FlatEntry>> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("📋 Enumerando lista {} [{}..={}]", url, start, end);

        let output = self
            .command()
            .args([
                "--flat-playlist",
                "--dump-json",
                "--playlist-start",
                &start.to_string(),
                "--playlist-end",
                &end.to_string(),
                "--no-warnings",
                url,
            ])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(parse_flat_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

/// Una entrada JSON por línea; las líneas inválidas se ignoran.
pub fn parse_flat_lines(stdout: &str) -> Vec<FlatEntry> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
        .collect()
}
