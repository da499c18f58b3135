//! HTTP boundary to the catalog API
//!
//! Only the three endpoints the playback core consumes: episode sources,
//! season episodes and progress persistence.

use crate::{
    progress::{ProgressSink, Viewer},
    types::{Episode, ProgressReport, VideoSource},
    Error, Result,
};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Default request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// List response as returned by the API.
///
/// Endpoints answer either `{"data": [...]}` or a bare array; both are
/// normalized to a `Vec`. Anything else, including a doubly wrapped
/// `{"data": {"data": [...]}}`, is malformed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn decode(raw: &str) -> Result<Vec<T>> {
        let envelope: Envelope<T> = serde_json::from_str(raw)
            .map_err(|err| Error::MalformedResponse(format!("unexpected list shape: {err}")))?;
        Ok(envelope.into_items())
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(items) => items,
        }
    }
}

/// Client for the catalog REST API
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    base: Url,
    viewer: Viewer,
}

impl CatalogClient {
    pub fn new(base_url: &str, viewer: Viewer) -> Result<Self> {
        Self::with_timeout(base_url, viewer, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(base_url: &str, viewer: Viewer, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base, viewer })
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = self.viewer.token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        Envelope::<T>::decode(&body)
    }

    /// Renditions of one episode
    #[instrument(skip(self))]
    pub async fn episode_sources(&self, episode_id: i64) -> Result<Vec<VideoSource>> {
        let url = self.endpoint(&format!("episodes/{episode_id}/sources"))?;
        let sources: Vec<VideoSource> = self.get_list(url).await.map_err(|err| match err {
            Error::Api { status: 404, .. } => Error::EpisodeNotFound { episode_id },
            other => other,
        })?;
        debug!(count = sources.len(), "Sources fetched");
        Ok(sources)
    }

    /// Episodes of a season, without sources
    #[instrument(skip(self))]
    pub async fn season_episodes(&self, season_id: i64) -> Result<Vec<Episode>> {
        let url = self.endpoint(&format!("seasons/{season_id}/episodes"))?;
        let episodes: Vec<Episode> = self.get_list(url).await?;
        debug!(count = episodes.len(), "Episodes fetched");
        Ok(episodes)
    }

    /// Episodes of a season with every episode's sources resolved
    pub async fn season_with_sources(&self, season_id: i64) -> Result<Vec<Episode>> {
        let episodes = self.season_episodes(season_id).await?;
        try_join_all(episodes.into_iter().map(|mut episode| async move {
            episode.sources = self.episode_sources(episode.id).await?;
            Ok::<_, Error>(episode)
        }))
        .await
    }

    /// Persist a progress report. Anonymous viewers never reach the endpoint.
    #[instrument(skip(self, report), fields(episode_id = report.episode_id))]
    pub async fn submit_progress(&self, report: &ProgressReport) -> Result<()> {
        let Some(token) = self.viewer.token() else {
            debug!("Anonymous viewer, progress not submitted");
            return Ok(());
        };
        let url = self.endpoint("progress")?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .json(report)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// [`ProgressSink`] backed by the catalog API
#[derive(Debug, Clone)]
pub struct HttpProgressSink {
    client: Arc<CatalogClient>,
}

impl HttpProgressSink {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
    async fn submit(&self, report: &ProgressReport) -> Result<()> {
        self.client.submit_progress(report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn test_envelope_wrapped_and_bare() {
        let wrapped = r#"{"data":[{"quality":"720p","url":"https://cdn.example.com/a.mp4","isDownloadable":false}],"total":1}"#;
        let bare = r#"[{"quality":"480p","url":"https://cdn.example.com/b.mp4"}]"#;
        assert_eq!(Envelope::<VideoSource>::decode(wrapped).unwrap()[0].quality, "720p");
        assert_eq!(Envelope::<VideoSource>::decode(bare).unwrap()[0].quality, "480p");
    }

    #[test]
    fn test_envelope_rejects_double_wrap() {
        let nested = r#"{"data":{"data":[]}}"#;
        let err = Envelope::<VideoSource>::decode(nested).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_RESPONSE");
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = CatalogClient::new("https://api.example.com/v1", Viewer::Anonymous).unwrap();
        assert_eq!(
            client.endpoint("episodes/3/sources").unwrap().as_str(),
            "https://api.example.com/v1/episodes/3/sources"
        );
    }

    /// Answers one request with `status` and hands the raw request back
    fn one_shot_server(status: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut data = Vec::new();
            let mut buf = [0_u8; 1024];
            loop {
                let read = stream.read(&mut buf).expect("read request");
                if read == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..read]);
                let text = String::from_utf8_lossy(&data).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if data.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&data).to_string());
            let _ = write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
        });
        (format!("http://{addr}/api"), rx)
    }

    #[tokio::test]
    async fn test_submit_progress_posts_json_with_token() {
        let (base, requests) = one_shot_server("204 No Content");
        let viewer = Viewer::Authenticated { token: "tok-123".into() };
        let client = CatalogClient::new(&base, viewer).unwrap();

        client
            .submit_progress(&ProgressReport { episode_id: 9, watched_seconds: 61.5, completed: true })
            .await
            .unwrap();

        let raw = requests.recv().unwrap();
        assert!(raw.starts_with("POST /api/progress "));
        assert!(raw.to_lowercase().contains("authorization: bearer tok-123"));
        assert!(raw.contains(r#""episodeId":9"#));
        assert!(raw.contains(r#""completed":true"#));
    }

    #[tokio::test]
    async fn test_submit_progress_maps_status() {
        let (base, _requests) = one_shot_server("500 Internal Server Error");
        let client = CatalogClient::new(&base, Viewer::Authenticated { token: "t".into() }).unwrap();
        let err = client
            .submit_progress(&ProgressReport { episode_id: 1, watched_seconds: 1.0, completed: false })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_anonymous_submit_is_noop() {
        let client = CatalogClient::new("http://127.0.0.1:9/api", Viewer::Anonymous).unwrap();
        client
            .submit_progress(&ProgressReport { episode_id: 1, watched_seconds: 1.0, completed: false })
            .await
            .unwrap();
    }
}
