//! Track sources: turns a user query into a playable stream.
//!
//! Queries are classified once, then handed to songbird's inputs:
//!
//! - links ending in a known audio extension are streamed over HTTP
//! - any other `http(s)` link goes through yt-dlp
//! - free text becomes a yt-dlp search for the first match

use async_trait::async_trait;
use songbird::input::{Compose, HttpRequest, Input, YoutubeDl};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::MusicError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle time allowed between two reads. Audio bodies stream for as long as
/// the track plays, so there is no deadline on the whole request.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"];

/// A stream ready to be handed to the player, plus whatever metadata the
/// source could tell us.
pub struct Resolved<S> {
    pub stream: S,
    pub title: Option<String>,
}

/// Stream resolver. No retries: a failure is final for the request.
#[async_trait]
pub trait TrackResolver: Send + Sync + 'static {
    type Stream: Send + 'static;

    async fn resolve(&self, query: &str) -> Result<Resolved<Self::Stream>, MusicError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    DirectAudio(Url),
    Link(Url),
    Search(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let trimmed = query.trim();
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let path = url.path().to_lowercase();
                if AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
                    QueryKind::DirectAudio(url)
                } else {
                    QueryKind::Link(url)
                }
            }
            _ => QueryKind::Search(trimmed.to_string()),
        }
    }
}

fn streaming_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()
}

/// Resolver backed by yt-dlp and plain HTTP.
pub struct YtDlpResolver {
    http: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            http: streaming_client()?,
        })
    }

    async fn probe(mut ytdl: YoutubeDl<'static>, query: &str) -> Result<Resolved<Input>, MusicError> {
        // Running the metadata query is what makes yt-dlp fail fast on bad input.
        let metadata = ytdl.aux_metadata().await.map_err(|e| {
            warn!("❌ yt-dlp could not resolve {}: {}", query, e);
            MusicError::Resolution(e.to_string())
        })?;

        info!(
            "✅ Resolved {} -> {}",
            query,
            metadata.title.as_deref().unwrap_or("untitled")
        );
        Ok(Resolved {
            stream: Input::from(ytdl),
            title: metadata.title,
        })
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    type Stream = Input;

    async fn resolve(&self, query: &str) -> Result<Resolved<Input>, MusicError> {
        match QueryKind::classify(query) {
            QueryKind::DirectAudio(url) => {
                debug!("🎯 Direct audio stream: {}", url);
                let title = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string);
                let request = HttpRequest::new(self.http.clone(), url.to_string());
                Ok(Resolved {
                    stream: Input::from(request),
                    title,
                })
            }
            QueryKind::Link(url) => {
                Self::probe(YoutubeDl::new(self.http.clone(), url.to_string()), query).await
            }
            QueryKind::Search(text) => {
                if text.is_empty() {
                    return Err(MusicError::Resolution("empty query".into()));
                }
                Self::probe(YoutubeDl::new_search(self.http.clone(), text), query).await
            }
        }
    }
}

/// Checks that the external tools used for playback are installed.
pub async fn verify_dependencies() -> anyhow::Result<()> {
    for (tool, flag) in [("yt-dlp", "--version"), ("ffmpeg", "-version")] {
        let output = async_process::Command::new(tool).arg(flag).output().await?;
        if !output.status.success() {
            anyhow::bail!("{} is installed but not runnable", tool);
        }
        debug!("✅ {} available", tool);
    }
    Ok(())
}
