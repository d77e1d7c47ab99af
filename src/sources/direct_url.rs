use std::time::Duration;
use tracing::debug;

use super::{ServiceKind, TrackSource};
use crate::error::{MusicError, MusicResult};

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"];

/// Cliente para enlaces directos a archivos de audio
pub struct DirectUrlClient {
    http: reqwest::Client,
}

impl DirectUrlClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Comprueba que el archivo responde y arma un descriptor sin duración.
    pub async fn get_track(&self, url: &str) -> MusicResult<TrackSource> {
        let response = self
            .http
            .head(url)
            .send()
            .await
            .map_err(MusicError::resolution)?;

        if !response.status().is_success() {
            return Err(MusicError::Resolution(format!(
                "Archivo no accesible: {}",
                response.status()
            )));
        }

        debug!("🔗 Archivo directo accesible: {}", url);
        Ok(TrackSource::new(Self::file_title(url), url, ServiceKind::Custom))
    }

    pub fn is_audio_file_url(url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let path = parsed.path().to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Nombre del archivo como título
    pub fn file_title(url: &str) -> String {
        url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| url.to_string())
    }
}

impl Default for DirectUrlClient {
    fn default() -> Self {
        Self::new()
    }
}
