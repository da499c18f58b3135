//! Source Selector
//!
//! Ranks the renditions of an episode, picks the default one and decides
//! whether a URL is played natively or through an embedded third-party player.

use crate::types::{SourceKind, VideoSource};
use std::cmp::Reverse;
use url::Url;

/// Host name fragments of players that can only be embedded
pub const EMBED_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

/// Leading integer of a quality label ("720p" -> 720)
pub fn quality_value(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Sort sources by quality, highest first. Ties keep their input order.
pub fn rank(sources: &[VideoSource]) -> Vec<VideoSource> {
    let mut ranked = sources.to_vec();
    // sort_by_key is stable; unparseable labels sort after every numeric one
    ranked.sort_by_key(|source| Reverse(quality_value(&source.quality)));
    ranked
}

/// Highest-quality source, or `None` for an empty set
pub fn default_source(sources: &[VideoSource]) -> Option<VideoSource> {
    rank(sources).into_iter().next()
}

/// Look up a source by its quality label
pub fn find_quality<'a>(sources: &'a [VideoSource], quality: &str) -> Option<&'a VideoSource> {
    sources
        .iter()
        .find(|source| source.quality.eq_ignore_ascii_case(quality.trim()))
}

/// Decides how sources are rendered
#[derive(Debug, Clone, Default)]
pub struct SourceClassifier {
    extra_hosts: Vec<String>,
}

impl SourceClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat additional hosts as embeddable
    pub fn with_extra_hosts(extra_hosts: impl IntoIterator<Item = String>) -> Self {
        Self {
            extra_hosts: extra_hosts
                .into_iter()
                .map(|host| host.trim().to_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, source: &VideoSource) -> SourceKind {
        self.classify_url(&source.url)
    }

    pub fn classify_url(&self, raw: &str) -> SourceKind {
        // Scheme-less CMS entries do not parse; match them as plain text
        let haystack = match Url::parse(raw.trim()) {
            Ok(url) => url.host_str().map(str::to_lowercase).unwrap_or_default(),
            Err(_) => raw.trim().to_lowercase(),
        };
        if haystack.is_empty() {
            return SourceKind::Direct;
        }

        let embedded = EMBED_HOSTS.iter().any(|known| haystack.contains(known))
            || self.extra_hosts.iter().any(|known| haystack.contains(known.as_str()));
        if embedded {
            SourceKind::Embedded
        } else {
            SourceKind::Direct
        }
    }
}

/// Classify with the built-in host list
pub fn classify(source: &VideoSource) -> SourceKind {
    SourceClassifier::new().classify(source)
}

/// Iframe URL for a YouTube watch page, short link or existing embed link.
/// Other embeddable hosts are returned unchanged.
pub fn embed_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{raw}")))
        .ok()?;
    let host = url.host_str()?.to_lowercase();

    let video_id = if host.ends_with("youtu.be") {
        url.path_segments()?.next().map(str::to_string)
    } else if host.contains("youtube") {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed") | Some("shorts") | Some("live") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        return Some(url.to_string());
    };

    video_id
        .filter(|id| !id.is_empty())
        .map(|id| format!("https://www.youtube.com/embed/{id}"))
}
