//! CLI command implementations

use crate::output::{clock, to_json, to_json_line, to_table, OutputFormat};
use crate::simulated::SimulatedElement;
use anistream_core::{
    download_filename, progress_channel, rank, source::find_quality, CatalogClient, Downloader,
    EpisodeList, HttpProgressSink, PlaybackState, PlayerConfig, PlayerNotice, PlayerSession,
    ProgressUploader, SourceClassifier, UploadStats, ViewMode, Viewer,
};
use anyhow::{bail, Context as _};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tracing::{debug, info, warn};
use url::Url;

/// Upper bound on simulated steps per watch run
const MAX_STEPS: usize = 1_000_000;

/// Shared state of one CLI invocation
pub struct Context {
    client: Arc<CatalogClient>,
    config: PlayerConfig,
    format: OutputFormat,
}

impl Context {
    pub fn new(
        api_base: &Url,
        token: Option<String>,
        config: PlayerConfig,
        format: OutputFormat,
    ) -> anyhow::Result<Self> {
        let viewer = Viewer::from_token(token);
        let client = CatalogClient::new(api_base.as_str(), viewer)?;
        Ok(Self { client: Arc::new(client), config, format })
    }

    fn classifier(&self) -> SourceClassifier {
        SourceClassifier::with_extra_hosts(self.config.extra_embed_hosts.clone())
    }
}

#[derive(Debug, Serialize, Tabled)]
struct SourceRow {
    rank: usize,
    quality: String,
    kind: String,
    downloadable: bool,
    default: bool,
    url: String,
}

/// List ranked sources of an episode
pub async fn sources(ctx: &Context, episode_id: i64) -> anyhow::Result<()> {
    let sources = ctx.client.episode_sources(episode_id).await?;
    let classifier = ctx.classifier();
    let rows: Vec<SourceRow> = rank(&sources)
        .into_iter()
        .enumerate()
        .map(|(i, source)| SourceRow {
            rank: i + 1,
            kind: classifier.classify(&source).to_string(),
            downloadable: source.is_downloadable,
            default: i == 0,
            quality: source.quality,
            url: source.url,
        })
        .collect();

    match ctx.format {
        OutputFormat::Json => println!("{}", to_json(&rows)),
        OutputFormat::Table => println!("{}", to_table(&rows)),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("{}", style(format!("Episode {episode_id} has no playable source")).yellow());
                return Ok(());
            }
            println!("Episode {episode_id}: {} source(s)", rows.len());
            for row in &rows {
                let marker = if row.default { style("*").green().bold() } else { style(" ") };
                let download = if row.downloadable { " [download]" } else { "" };
                println!("  {marker} {:<8} {:<9}{download} {}", row.quality, row.kind, style(&row.url).dim());
            }
        }
    }
    Ok(())
}

/// Download a rendition to disk
pub async fn download(
    ctx: &Context,
    episode_id: i64,
    title: &str,
    episode_number: u32,
    quality: Option<&str>,
    output: &Path,
) -> anyhow::Result<()> {
    let sources = ctx.client.episode_sources(episode_id).await?;
    let ranked = rank(&sources);
    let source = match quality {
        Some(label) => find_quality(&ranked, label)
            .cloned()
            .with_context(|| format!("quality {label} is not available for episode {episode_id}"))?,
        None => match ranked.first() {
            Some(source) => source.clone(),
            None => bail!("episode {episode_id} has no sources"),
        },
    };

    let file_name = download_filename(title, episode_number);
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("=> "),
    );
    bar.set_message(file_name.clone());

    let path = Downloader::new()
        .download(&source, output, &file_name, |done, total| {
            if let Some(total) = total {
                bar.set_length(total);
            }
            bar.set_position(done);
        })
        .await;
    let path = match path {
        Ok(path) => path,
        Err(err) => {
            bar.abandon();
            return Err(err.into());
        }
    };
    bar.finish_and_clear();

    match ctx.format {
        OutputFormat::Json => println!(
            "{}",
            to_json(&serde_json::json!({
                "episodeId": episode_id,
                "quality": source.quality,
                "path": path.display().to_string(),
            }))
        ),
        OutputFormat::Text | OutputFormat::Table => {
            println!("{} {}", style("Saved").green().bold(), path.display());
        }
    }
    Ok(())
}

/// Options of the watch command
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub start_episode: Option<i64>,
    pub duration: f64,
    pub tick: f64,
    pub delay_ms: u64,
    pub quality: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct WatchedRow {
    episode_id: i64,
    number: u32,
    quality: String,
    outcome: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchSummary {
    session_id: String,
    episodes: Vec<WatchedRow>,
    uploads: Option<UploadStats>,
}

/// Watch a season on the simulated element, following auto-advance
pub async fn watch(ctx: &Context, season_id: i64, options: WatchOptions) -> anyhow::Result<()> {
    let positive = |value: f64| value.is_finite() && value > 0.0;
    if !positive(options.duration) || !positive(options.tick) {
        bail!("duration and tick must be positive");
    }

    let episodes = EpisodeList::new(ctx.client.season_with_sources(season_id).await?);
    let Some(first) = episodes.iter().next().map(|episode| episode.id) else {
        bail!("season {season_id} has no episodes");
    };
    let start = options.start_episode.unwrap_or(first);

    let viewer = ctx.client.viewer().clone();
    let (tx, rx) = progress_channel();
    let uploader = viewer.is_authenticated().then(|| {
        let uploader = ProgressUploader::new(Arc::new(HttpProgressSink::new(Arc::clone(&ctx.client))));
        let stats = uploader.stats();
        (uploader.spawn(rx), stats)
    });
    if uploader.is_none() {
        info!("No token given, progress will not be saved");
    }

    let element = SimulatedElement::new(options.duration, options.tick);
    let mut session = PlayerSession::new(
        Box::new(element.clone()),
        episodes,
        &viewer,
        tx,
        ctx.config.clone(),
    );
    let mut notices = session.subscribe_notices();
    let session_id = session.id().to_string();
    info!(session_id = %session_id, season_id, start, "Starting watch session");

    session.open_episode(start)?;
    apply_quality(&mut session, options.quality.as_deref());

    let bar = ProgressBar::new(options.duration.round() as u64);
    bar.set_style(ProgressStyle::with_template("{msg:>12} [{wide_bar:.magenta/blue}] {prefix}")?);
    bar.set_message(format!("Episode {}", episode_number(&session)));

    let mut watched = Vec::new();
    let mut finished = false;
    for _ in 0..MAX_STEPS {
        match element.step() {
            Some((token, event)) => {
                session.handle_media_event(token, event);
            }
            None => {
                if !resume_or_skip(&mut session, &element) {
                    break;
                }
            }
        }

        for notice in notices.drain() {
            report_notice(ctx.format, &notice, &bar);
            match &notice {
                PlayerNotice::AdvancedTo { .. } => {
                    if let Some(row) = watched_row(&session, &watched, "completed") {
                        watched.push(row);
                    }
                    apply_quality(&mut session, options.quality.as_deref());
                    bar.set_message(format!("Episode {}", episode_number(&session)));
                }
                PlayerNotice::EndOfContent { .. } => finished = true,
                _ => {}
            }
        }

        let elapsed = session.controller().elapsed();
        bar.set_position(elapsed.round() as u64);
        bar.set_prefix(format!("{} / {}", clock(elapsed), clock(options.duration)));

        if finished && session.controller().state() == PlaybackState::Ended {
            break;
        }
        if options.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.delay_ms)).await;
        }
    }
    bar.finish_and_clear();

    let outcome = if finished { "completed" } else { "stopped" };
    if let Some(current) = session.current_episode() {
        if !watched.iter().any(|row: &WatchedRow| row.episode_id == current) {
            let quality = current_quality(&session);
            watched.push(WatchedRow {
                episode_id: current,
                number: episode_number(&session),
                quality,
                outcome: outcome.to_string(),
            });
        }
    }

    // Closing the session closes the report queue; the uploader then drains and exits
    drop(session);
    let uploads = match uploader {
        Some((handle, stats)) => {
            handle.await.context("progress uploader panicked")?;
            let stats = stats.read().await.clone();
            Some(stats)
        }
        None => None,
    };

    print_summary(ctx.format, WatchSummary { session_id, episodes: watched, uploads });
    Ok(())
}

/// Get a stalled element moving again (autoplay may be off in the config).
/// Returns false when nothing is left to play.
fn resume_or_skip(session: &mut PlayerSession, element: &SimulatedElement) -> bool {
    let mode = session.controller().mode().clone();
    match mode {
        ViewMode::Direct => match session.controller().state() {
            PlaybackState::Idle | PlaybackState::Paused => {
                debug!(url = ?element.current_url(), "Starting playback");
                match session.controller_mut().play() {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(error = %err, "Could not start playback");
                        false
                    }
                }
            }
            PlaybackState::Playing => true,
            PlaybackState::Ended => false,
        },
        ViewMode::Embedded { embed_url } => {
            warn!(embed_url = %embed_url, "Embedded player cannot be simulated, skipping episode");
            session.next_episode().is_some()
        }
        ViewMode::Unplayable { failure } => {
            warn!(failure = %failure, "Skipping unplayable episode");
            session.next_episode().is_some()
        }
        ViewMode::Empty => false,
    }
}

fn apply_quality(session: &mut PlayerSession, quality: Option<&str>) {
    let Some(quality) = quality else {
        return;
    };
    let current = current_quality(session);
    if current.eq_ignore_ascii_case(quality) {
        return;
    }
    if let Err(err) = session.switch_quality(quality) {
        warn!(error = %err, fallback = %current, "Preferred quality unavailable");
    }
}

fn current_quality(session: &PlayerSession) -> String {
    session
        .controller()
        .source()
        .map(|source| source.quality.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn episode_number(session: &PlayerSession) -> u32 {
    session
        .current_episode()
        .and_then(|id| session.episodes().get(id))
        .map_or(0, |episode| episode.number)
}

/// Row for the episode that was active before an auto-advance
fn watched_row(session: &PlayerSession, watched: &[WatchedRow], outcome: &str) -> Option<WatchedRow> {
    let current = session.current_episode()?;
    let previous = session.episodes().previous_before(current)?;
    if watched.iter().any(|row| row.episode_id == previous.id) {
        return None;
    }
    Some(WatchedRow {
        episode_id: previous.id,
        number: previous.number,
        quality: rank(&previous.sources)
            .first()
            .map(|source| source.quality.clone())
            .unwrap_or_else(|| "-".to_string()),
        outcome: outcome.to_string(),
    })
}

fn report_notice(format: OutputFormat, notice: &PlayerNotice, bar: &ProgressBar) {
    if format == OutputFormat::Json {
        bar.suspend(|| println!("{}", to_json_line(notice)));
        return;
    }
    let line = match notice {
        PlayerNotice::EpisodeLoaded { episode_id, quality, kind } => {
            format!("{} episode {episode_id} ({quality}, {kind})", style("Loaded").cyan())
        }
        PlayerNotice::QualityChanged { quality } => format!("{} {quality}", style("Quality").cyan()),
        PlayerNotice::AdvancedTo { number, .. } => {
            format!("{} episode {number}", style("Up next:").green().bold())
        }
        PlayerNotice::EndOfContent { .. } => format!("{}", style("End of season").green().bold()),
        PlayerNotice::Unplayable { episode_id, failure } => {
            format!("{} episode {episode_id}: {failure}", style("Unplayable").red())
        }
    };
    bar.println(line);
}

fn print_summary(format: OutputFormat, summary: WatchSummary) {
    match format {
        OutputFormat::Json => println!("{}", to_json(&summary)),
        OutputFormat::Table | OutputFormat::Text => {
            println!("{}", to_table(&summary.episodes));
            match &summary.uploads {
                Some(stats) => {
                    let last = stats
                        .last_success_at
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "Progress saved: {} report(s), {} failed, last success {last}",
                        stats.sent, stats.failed
                    );
                    if let Some(error) = &stats.last_error {
                        println!("{} {error}", style("Last upload error:").yellow());
                    }
                }
                None => println!("{}", style("Progress not saved (anonymous)").dim()),
            }
        }
    }
}
