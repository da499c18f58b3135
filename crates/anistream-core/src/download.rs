//! Rendition downloads

use crate::{types::VideoSource, Error, Result};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// `"<title> - Episode <n>.mp4"`, with characters that would escape the
/// target directory replaced
pub fn download_filename(title: &str, episode_number: u32) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    let title = if cleaned.is_empty() { "Episode" } else { cleaned };
    format!("{title} - Episode {episode_number}.mp4")
}

/// Streams a rendition to disk
#[derive(Debug, Clone, Default)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Download `source` into `dir/file_name`.
    ///
    /// `on_progress` receives the bytes written so far and the total when
    /// the server announced one. The file only appears under its final name
    /// once the body has been fully written.
    #[instrument(skip(self, source, on_progress), fields(quality = %source.quality))]
    pub async fn download<F>(
        &self,
        source: &VideoSource,
        dir: &Path,
        file_name: &str,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(u64, Option<u64>),
    {
        if !source.is_downloadable {
            return Err(Error::NotDownloadable { quality: source.quality.clone() });
        }

        let response = self.client.get(&source.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api { url: source.url.clone(), status: status.as_u16() });
        }
        let total = response.content_length();

        fs::create_dir_all(dir).await?;
        let target = dir.join(file_name);
        let partial = dir.join(format!("{file_name}.part"));
        let file = fs::File::create(&partial).await?;

        let finished = async {
            let written = write_body(file, response, &mut on_progress, total).await?;
            fs::rename(&partial, &target).await?;
            Ok::<_, Error>(written)
        }
        .await;
        let written = match finished {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    warn!(error = %cleanup, "Could not remove partial download");
                }
                return Err(err);
            }
        };

        debug!(bytes = written, "Body written");
        info!(path = %target.display(), bytes = written, "Download finished");
        Ok(target)
    }
}

async fn write_body<F>(
    mut file: fs::File,
    response: reqwest::Response,
    on_progress: &mut F,
    total: Option<u64>,
) -> Result<u64>
where
    F: FnMut(u64, Option<u64>),
{
    let mut written = 0_u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_progress(written, total);
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn serve_once(body: &'static [u8]) -> std::net::SocketAddr {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0_u8; 512];
            while !String::from_utf8_lossy(&seen).contains("\r\n\r\n") {
                let read = stream.read(&mut buf).unwrap();
                if read == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..read]);
            }
            write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len()).unwrap();
            stream.write_all(body).unwrap();
        });
        addr
    }

    #[test]
    fn test_filename() {
        assert_eq!(download_filename("Frieren", 3), "Frieren - Episode 3.mp4");
        assert_eq!(download_filename("Fate/Zero", 1), "Fate_Zero - Episode 1.mp4");
        assert_eq!(download_filename("../..", 2), "_ - Episode 2.mp4");
        assert_eq!(download_filename("  ", 5), "Episode - Episode 5.mp4");
    }

    #[tokio::test]
    async fn test_refuses_non_downloadable() {
        let dir = tempfile::tempdir().unwrap();
        let source = VideoSource::new("1080p", "https://cdn.example.com/ep.mp4");
        let err = Downloader::new()
            .download(&source, dir.path(), "ep.mp4", |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotDownloadable { .. }));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_streams_body_to_disk() {
        let addr = serve_once(b"not really a video");

        let dir = tempfile::tempdir().unwrap();
        let source = VideoSource::new("720p", format!("http://{addr}/ep1.mp4")).with_downloadable(true);
        let mut last = (0, None);
        let path = Downloader::new()
            .download(&source, dir.path(), &download_filename("Mushishi", 1), |done, total| {
                last = (done, total);
            })
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "Mushishi - Episode 1.mp4");
        assert_eq!(std::fs::read(&path).unwrap(), b"not really a video");
        assert_eq!(last, (18, Some(18)));
        assert!(!dir.path().join("Mushishi - Episode 1.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_partial_file() {
        let addr = serve_once(b"bytes");
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory already sits at the final name
        std::fs::create_dir(dir.path().join("ep.mp4")).unwrap();
        std::fs::write(dir.path().join("ep.mp4").join("keep"), b"x").unwrap();

        let source = VideoSource::new("720p", format!("http://{addr}/ep.mp4")).with_downloadable(true);
        let result = Downloader::new()
            .download(&source, dir.path(), "ep.mp4", |_, _| {})
            .await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!dir.path().join("ep.mp4.part").exists());
    }
}
