//! Turns raw focus/idle observations into tracker calls.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ft_core::{FocusSource, SourceError, Tracker, WindowSnapshot};
use tracing::debug;

/// One sample from a [`FocusSource`].
#[derive(Debug)]
pub struct Observation {
    pub idle: Duration,
    /// `None` when the user was idle and the window was not queried.
    pub window: Option<Result<WindowSnapshot, SourceError>>,
}

/// Samples `source`. Blocking.
///
/// A failed idle query counts as no idle time. The focused window is only
/// queried while the user is active.
pub fn observe(source: &dyn FocusSource, idle_threshold: Duration) -> Observation {
    let idle = source.poll_idle_duration().unwrap_or_else(|err| {
        debug!(error = %err, "idle query failed");
        Duration::zero()
    });
    if idle >= idle_threshold {
        return Observation { idle, window: None };
    }
    Observation {
        idle,
        window: Some(source.poll()),
    }
}

/// What a sample changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// The user just went idle.
    Idle,
    /// A different application gained focus, or focus resumed after idle.
    Focus(WindowSnapshot),
    /// Same application, new window title.
    Title(String),
    Unchanged,
    /// The source could not be read this cycle.
    Skipped,
}

/// Feeds observations into a [`Tracker`], remembering the last window seen.
#[derive(Debug)]
pub struct Monitor {
    tracker: Arc<Tracker>,
    idle_threshold: Duration,
    last: Option<WindowSnapshot>,
}

impl Monitor {
    pub const fn new(tracker: Arc<Tracker>, idle_threshold: Duration) -> Self {
        Self {
            tracker,
            idle_threshold,
            last: None,
        }
    }

    pub fn apply(&mut self, observation: Observation, now: DateTime<Utc>) -> PollEvent {
        if observation.idle >= self.idle_threshold {
            if self.tracker.is_idle() {
                return PollEvent::Unchanged;
            }
            // The user stopped interacting `idle` ago, not now.
            self.tracker
                .observe_idle_transition_at(true, now - observation.idle);
            self.last = None;
            return PollEvent::Idle;
        }

        if self.tracker.is_idle() {
            self.tracker.observe_idle_transition_at(false, now);
        }

        let snapshot = match observation.window {
            Some(Ok(snapshot)) => snapshot,
            Some(Err(err)) => {
                debug!(error = %err, "focus query failed, skipping cycle");
                return PollEvent::Skipped;
            }
            None => return PollEvent::Skipped,
        };

        match &self.last {
            Some(last) if last.application_id == snapshot.application_id => {
                if last.window_title == snapshot.window_title {
                    return PollEvent::Unchanged;
                }
                self.tracker.refresh_title(&snapshot.window_title);
                let title = snapshot.window_title.clone();
                self.last = Some(snapshot);
                PollEvent::Title(title)
            }
            _ => {
                self.tracker
                    .observe_focus_at(&snapshot.application_id, &snapshot.window_title, now);
                self.last = Some(snapshot.clone());
                PollEvent::Focus(snapshot)
            }
        }
    }
}
