use super::{ytdlp::YtDlp, ServiceKind, TrackSource};
use crate::error::{MusicError, MusicResult};

/// Cliente de SoundCloud sobre el extractor de yt-dlp
pub struct SoundCloudClient {
    ytdlp: YtDlp,
}

impl SoundCloudClient {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }

    pub async fn get_track(&self, url: &str) -> MusicResult<TrackSource> {
        let info = self.ytdlp.dump_json(url).await.map_err(MusicError::resolution)?;
        Ok(info.into_track(ServiceKind::SoundCloud))
    }

    pub fn is_soundcloud_url(url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "soundcloud.com" || h.ends_with(".soundcloud.com")))
            .unwrap_or(false)
    }

    /// Los sets son las listas de SoundCloud
    pub fn is_playlist_url(url: &str) -> bool {
        Self::is_soundcloud_url(url) && url.contains("/sets/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundcloud_url_detection() {
        assert!(SoundCloudClient::is_soundcloud_url("https://soundcloud.com/artist/track"));
        assert!(SoundCloudClient::is_soundcloud_url("https://m.soundcloud.com/artist/track"));
        assert!(!SoundCloudClient::is_soundcloud_url("https://notsoundcloud.com/a"));
        assert!(SoundCloudClient::is_playlist_url("https://soundcloud.com/artist/sets/album"));
        assert!(!SoundCloudClient::is_playlist_url("https://soundcloud.com/artist/track"));
    }
}
