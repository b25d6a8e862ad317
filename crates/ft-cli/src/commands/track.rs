//! `ft track`: the poll/submit control loop.
//!
//! One `select!` loop owns every tracker mutation: polling the focus source,
//! periodic submission, and shutdown. Submission therefore never races with a
//! poll, and closed sessions are only cleared after the cycle that read them.

use std::fmt::Write;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use ft_core::{
    ActivitySummary, CHUNK_SIZE, FocusSource, IgnoreList, LegacyPayload, Summaries, Tracker,
    chunk,
};
use ft_db::Database;
use ft_sinks::{RetryPolicy, Sink, StoreSink, SubmitOptions, TimeTrackingSink, WebhookSink};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::util::{format_duration, format_window};
use crate::config::Config;
use crate::desktop::GnomeSource;
use crate::monitor::{Monitor, PollEvent, observe};
use crate::watch::IgnoreWatcher;

/// What happens on every submission tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Track only.
    Off,
    /// Print the payloads that would be sent.
    DryRun,
    /// Send to the configured sinks.
    Submit,
}

impl SubmitMode {
    pub const fn from_flags(submit: bool, dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else if submit {
            Self::Submit
        } else {
            Self::Off
        }
    }
}

/// Everything the control loop needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub poll_interval: StdDuration,
    pub submit_interval: StdDuration,
    pub idle_threshold: Duration,
    pub mode: SubmitMode,
    pub submit: SubmitOptions,
    /// Where summaries are saved, if `--save` was given.
    pub save_path: Option<PathBuf>,
    /// Ignore file to follow for edits while running.
    pub ignore_path: Option<PathBuf>,
}

pub fn run(config: &Config, submit: bool, dry_run: bool, save: bool) -> Result<()> {
    let mode = SubmitMode::from_flags(submit, dry_run);
    config.validate(mode == SubmitMode::Submit)?;

    let ignored = IgnoreList::load(&config.ignore_path).context("failed to load ignore list")?;
    if !ignored.is_empty() {
        info!(count = ignored.len(), "loaded ignore list");
    }
    let tracker = Arc::new(Tracker::new(config.tracker_config(), ignored));

    let sinks = if mode == SubmitMode::Submit {
        build_sinks(config)?
    } else {
        Vec::new()
    };

    let settings = LoopSettings {
        poll_interval: config.poll_interval(),
        submit_interval: config.submit_interval(),
        idle_threshold: config.idle_threshold(),
        mode,
        submit: SubmitOptions {
            floor: config.submit_floor(),
            retry: RetryPolicy::default(),
        },
        save_path: save.then(|| config.sessions_path.clone()),
        ignore_path: Some(config.ignore_path.clone()),
    };

    match mode {
        SubmitMode::Submit => info!(
            sinks = sinks.len(),
            interval_secs = settings.submit_interval.as_secs(),
            "submission enabled"
        ),
        SubmitMode::DryRun => info!(
            interval_secs = settings.submit_interval.as_secs(),
            "dry run: payloads will be printed, nothing is sent"
        ),
        SubmitMode::Off => {}
    }

    let source: Arc<dyn FocusSource> = Arc::new(GnomeSource::new());
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let summaries = runtime.block_on(run_loop(
        source,
        tracker,
        &sinks,
        &settings,
        wait_for_shutdown(),
    ))?;

    print!("{}", format_report(&summaries));
    Ok(())
}

/// Builds every sink the configuration enables.
pub fn build_sinks(config: &Config) -> Result<Vec<Arc<dyn Sink>>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if config.has_time_tracking_keys() {
        let sink = TimeTrackingSink::new(config.credentials(), config.endpoints())
            .context("failed to set up time-tracking sink")?;
        debug!(strategies = ?sink.strategy_names(), "time-tracking sink ready");
        sinks.push(Arc::new(sink));
    }
    if let Some(url) = &config.webhook.url {
        let sink = WebhookSink::new(url.clone(), &config.webhook.headers)
            .context("failed to set up webhook sink")?;
        sinks.push(Arc::new(sink));
    }
    if let Some(path) = &config.database_path {
        let db = Database::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        sinks.push(Arc::new(StoreSink::new(db)));
    }
    Ok(sinks)
}

/// Runs until `shutdown` resolves, then flushes and returns the final
/// summaries.
pub async fn run_loop<F>(
    source: Arc<dyn FocusSource>,
    tracker: Arc<Tracker>,
    sinks: &[Arc<dyn Sink>],
    settings: &LoopSettings,
    shutdown: F,
) -> Result<Summaries>
where
    F: Future<Output = Result<()>>,
{
    let mut monitor = Monitor::new(Arc::clone(&tracker), settings.idle_threshold);
    let mut watcher = settings.ignore_path.as_deref().map(IgnoreWatcher::new);

    let mut poll = tokio::time::interval(settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut submit = tokio::time::interval_at(
        Instant::now() + settings.submit_interval,
        settings.submit_interval,
    );
    submit.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let submitting = settings.mode != SubmitMode::Off;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("shutting down");
                break;
            }
            _ = poll.tick() => {
                if let Some(watcher) = watcher.as_mut() {
                    watcher.sync(&tracker);
                }
                poll_once(&source, &mut monitor, settings.idle_threshold).await;
            }
            _ = submit.tick(), if submitting => {
                submit_cycle(&tracker, sinks, settings).await;
            }
        }
    }

    tracker.end_open_session();
    let summaries = tracker.get_summaries();
    let list: Vec<ActivitySummary> = summaries.values().cloned().collect();
    let sessions = tracker.session_records();

    match settings.mode {
        SubmitMode::Submit => {
            // One attempt per sink so shutdown cannot hang on a dead endpoint.
            let options = SubmitOptions {
                retry: RetryPolicy::single_attempt(),
                ..settings.submit
            };
            let report = ft_sinks::submit_all(sinks, &list, &sessions, &options).await;
            info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "final submission finished"
            );
        }
        SubmitMode::DryRun => print!("{}", format_preview(&list, settings.submit.floor)),
        SubmitMode::Off => {}
    }
    if let Some(path) = &settings.save_path {
        save_or_log(path, &list);
    }

    Ok(summaries)
}

async fn poll_once(source: &Arc<dyn FocusSource>, monitor: &mut Monitor, idle_threshold: Duration) {
    let source = Arc::clone(source);
    let observation =
        match tokio::task::spawn_blocking(move || observe(source.as_ref(), idle_threshold)).await {
            Ok(observation) => observation,
            Err(err) => {
                warn!(error = %err, "focus poll task failed");
                return;
            }
        };

    match monitor.apply(observation, Utc::now()) {
        PollEvent::Focus(snapshot) => {
            println!(
                "{} [{}]",
                format_window(&snapshot.application_id, &snapshot.window_title),
                Local::now().format("%H:%M:%S")
            );
        }
        PollEvent::Title(title) => {
            debug!(window_title = %title, "window title changed");
        }
        PollEvent::Idle => info!("user idle, session closed"),
        PollEvent::Unchanged | PollEvent::Skipped => {}
    }
}

/// Runs one submission tick.
///
/// Summaries cover every closed session plus the open one, measured from its
/// `start_time` to now. The open session is not cleared, so until it closes
/// each cycle reports it again with a longer duration: a focused hour with
/// 15 minute cycles goes out as 15, 30 and 45 minute entries before the final
/// one. Session records only carry closed sessions and are sent once.
async fn submit_cycle(tracker: &Tracker, sinks: &[Arc<dyn Sink>], settings: &LoopSettings) {
    let summaries = tracker.get_summaries();
    if summaries.is_empty() {
        debug!("nothing to submit");
        return;
    }
    let list: Vec<ActivitySummary> = summaries.into_values().collect();
    let sessions = tracker.session_records();

    let keep = match settings.mode {
        SubmitMode::Submit => {
            let report = ft_sinks::submit_all(sinks, &list, &sessions, &settings.submit).await;
            report.has_transient_failures()
        }
        SubmitMode::DryRun => {
            print!("{}", format_preview(&list, settings.submit.floor));
            false
        }
        SubmitMode::Off => false,
    };

    if let Some(path) = &settings.save_path {
        save_or_log(path, &list);
    }

    if keep {
        warn!("some submissions failed transiently, keeping sessions for the next cycle");
    } else {
        tracker.clear_closed_sessions();
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("received Ctrl+C");
    Ok(())
}

/// Renders the legacy payloads a real submission would send.
pub fn format_preview(summaries: &[ActivitySummary], floor: Duration) -> String {
    let mut output = String::new();
    let eligible: Vec<&ActivitySummary> = summaries
        .iter()
        .filter(|s| s.total_duration >= floor)
        .collect();

    if eligible.is_empty() {
        output.push_str("No activities to preview.\n");
        return output;
    }

    let _ = writeln!(
        output,
        "\n=== DRY RUN: would submit {} activities ===",
        eligible.len()
    );
    for summary in eligible {
        for piece in chunk(summary, CHUNK_SIZE) {
            let payload = LegacyPayload::from_summary(&piece);
            if let Err(err) = payload.validate() {
                error!(application_id = %piece.application_id, error = %err, "invalid payload");
                continue;
            }
            match serde_json::to_string_pretty(&payload) {
                Ok(json) => {
                    let _ = writeln!(output, "\n[PREVIEW] Would submit:\n{json}");
                }
                Err(err) => error!(error = %err, "failed to render payload"),
            }
        }
    }
    output.push_str("\n=== End of preview ===\n");
    output
}

/// Renders the summary printed when tracking stops.
#[allow(
    clippy::cast_precision_loss,
    reason = "millisecond totals stay far below f64 precision limits"
)]
pub fn format_report(summaries: &Summaries) -> String {
    let mut output = String::from("\n=== Activity Summary ===\n");
    if summaries.is_empty() {
        output.push_str("No activities tracked.\n");
        return output;
    }

    let total = summaries
        .values()
        .fold(Duration::zero(), |acc, s| acc + s.total_duration);
    let _ = writeln!(output, "Total tracking time: {}\n", format_duration(total));

    let mut ordered: Vec<&ActivitySummary> = summaries.values().collect();
    ordered.sort_by(|a, b| b.total_duration.cmp(&a.total_duration));

    for summary in ordered {
        let share = if total > Duration::zero() {
            summary.total_duration.num_milliseconds() as f64 / total.num_milliseconds() as f64
                * 100.0
        } else {
            0.0
        };
        let _ = writeln!(
            output,
            "{}: {} ({share:.1}%) - {} sessions",
            summary.application_id,
            format_duration(summary.total_duration),
            summary.session_count
        );
        let _ = writeln!(output, "  └─ {}\n", summary.activity_details);
    }
    output
}

#[derive(Debug, Serialize)]
struct SavedSessions<'a> {
    timestamp: DateTime<Utc>,
    summaries: &'a [ActivitySummary],
}

/// Writes `summaries` to `path` as pretty JSON, replacing the file.
pub fn save_summaries(path: &Path, summaries: &[ActivitySummary]) -> Result<()> {
    let saved = SavedSessions {
        timestamp: Utc::now(),
        summaries,
    };
    let json = serde_json::to_string_pretty(&saved).context("failed to serialize summaries")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn save_or_log(path: &Path, summaries: &[ActivitySummary]) {
    match save_summaries(path, summaries) {
        Ok(()) => debug!(path = %path.display(), "saved summaries"),
        Err(err) => error!(error = %format!("{err:#}"), "failed to save summaries"),
    }
}
