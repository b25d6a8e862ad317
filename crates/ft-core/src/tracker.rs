//! The session state machine.
//!
//! [`Tracker`] turns a stream of focus and idle observations into closed
//! [`ActivitySession`]s. All state sits behind one [`RwLock`]: observation
//! methods take the write side, queries take the read side.

use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::aggregate::{Summaries, summarize};
use crate::ignore::{IgnoreList, IgnoreListError, write_rendered};
use crate::session::{ActivitySession, SessionRecord};

/// Thresholds applied when a session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Largest gap that joins two sessions of the same application.
    pub merge_threshold: Duration,
    /// Shortest session that is kept.
    pub min_duration: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            merge_threshold: Duration::seconds(30),
            min_duration: Duration::seconds(10),
        }
    }
}

#[derive(Debug)]
struct State {
    current: Option<ActivitySession>,
    closed: Vec<ActivitySession>,
    ignored: IgnoreList,
    idle: bool,
}

/// Result of [`Tracker::sync_ignored`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl IgnoreChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Thread-safe focus session tracker.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    state: RwLock<State>,
    // Serialises ignore-list writes so the file always reflects the latest set.
    persist: Mutex<()>,
}

impl Tracker {
    pub fn new(config: TrackerConfig, ignored: IgnoreList) -> Self {
        Self {
            config,
            state: RwLock::new(State {
                current: None,
                closed: Vec::new(),
                ignored,
                idle: false,
            }),
            persist: Mutex::new(()),
        }
    }

    pub const fn config(&self) -> TrackerConfig {
        self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records that `application_id` gained focus now.
    pub fn observe_focus(&self, application_id: &str, window_title: &str) {
        self.observe_focus_at(application_id, window_title, Utc::now());
    }

    /// Records that `application_id` gained focus at `now`.
    ///
    /// Any open session is closed. Ignored applications leave the tracker
    /// with no open session.
    pub fn observe_focus_at(&self, application_id: &str, window_title: &str, now: DateTime<Utc>) {
        let mut state = self.write();
        self.close_current(&mut state, now);
        if state.ignored.contains(application_id) {
            debug!(application_id, "focus on ignored application");
            return;
        }
        debug!(application_id, window_title, "session opened");
        state.current = Some(ActivitySession::open(application_id, window_title, now));
    }

    /// Updates the title of the open session without splitting it.
    ///
    /// Returns `true` if a session was open and its title changed.
    pub fn refresh_title(&self, window_title: &str) -> bool {
        let mut state = self.write();
        match state.current.as_mut() {
            Some(session) if session.window_title != window_title => {
                session.window_title = window_title.to_string();
                true
            }
            _ => false,
        }
    }

    /// Records an idle transition now.
    pub fn observe_idle_transition(&self, is_idle: bool) {
        self.observe_idle_transition_at(is_idle, Utc::now());
    }

    /// Records an idle transition that happened at `at`.
    ///
    /// Becoming idle closes the open session at `at` (never before its start).
    /// Becoming active only clears the flag. Repeated states are no-ops.
    pub fn observe_idle_transition_at(&self, is_idle: bool, at: DateTime<Utc>) {
        let mut state = self.write();
        match (state.idle, is_idle) {
            (false, true) => {
                self.close_current(&mut state, at);
                state.idle = true;
                debug!("user idle");
            }
            (true, false) => {
                state.idle = false;
                debug!("user active");
            }
            _ => {}
        }
    }

    /// Closes the open session now, if any.
    pub fn end_open_session(&self) {
        self.end_open_session_at(Utc::now());
    }

    /// Closes the open session at `now`, if any.
    pub fn end_open_session_at(&self, now: DateTime<Utc>) {
        let mut state = self.write();
        self.close_current(&mut state, now);
    }

    /// Summaries of closed sessions plus the open one, ended provisionally now.
    pub fn get_summaries(&self) -> Summaries {
        self.get_summaries_at(Utc::now())
    }

    pub fn get_summaries_at(&self, now: DateTime<Utc>) -> Summaries {
        let state = self.read();
        summarize(&state.closed, state.current.as_ref(), now)
    }

    /// Drops every closed session. The open session is kept.
    pub fn clear_closed_sessions(&self) {
        let mut state = self.write();
        debug!(count = state.closed.len(), "cleared closed sessions");
        state.closed.clear();
    }

    pub fn closed_sessions(&self) -> Vec<ActivitySession> {
        self.read().closed.clone()
    }

    /// Closed sessions as records, flagged with the current ignore state.
    pub fn session_records(&self) -> Vec<SessionRecord> {
        let state = self.read();
        state
            .closed
            .iter()
            .filter_map(|s| s.record(state.ignored.contains(&s.application_id)))
            .collect()
    }

    pub fn current_session(&self) -> Option<ActivitySession> {
        self.read().current.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.read().idle
    }

    pub fn is_ignored(&self, application_id: &str) -> bool {
        self.read().ignored.contains(application_id)
    }

    /// Ignored identifiers in sorted order.
    pub fn ignored(&self) -> Vec<String> {
        self.read().ignored.iter().map(String::from).collect()
    }

    /// Ignores `application_id` from now on.
    ///
    /// An open session of that application is closed. Returns `false` if it
    /// was already ignored. The error only reports a failed write of the
    /// ignore file; the in-memory change has already happened.
    pub fn set_ignored(&self, application_id: &str) -> Result<bool, IgnoreListError> {
        self.set_ignored_at(application_id, Utc::now())
    }

    pub fn set_ignored_at(
        &self,
        application_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, IgnoreListError> {
        {
            let mut state = self.write();
            if !state.ignored.insert(application_id) {
                return Ok(false);
            }
            self.close_if_focused(&mut state, application_id, now);
        }
        tracing::info!(application_id, "application ignored");
        self.persist_ignored()?;
        Ok(true)
    }

    /// Stops ignoring `application_id`. Returns `false` if it was not ignored.
    pub fn unset_ignored(&self, application_id: &str) -> Result<bool, IgnoreListError> {
        if !self.write().ignored.remove(application_id) {
            return Ok(false);
        }
        tracing::info!(application_id, "application no longer ignored");
        self.persist_ignored()?;
        Ok(true)
    }

    /// Adopts `latest` as the ignore set without writing it back.
    ///
    /// For picking up edits another process made to the ignore file. Newly
    /// ignored applications are handled as in [`Tracker::set_ignored`].
    pub fn sync_ignored(&self, latest: IgnoreList) -> IgnoreChanges {
        self.sync_ignored_at(latest, Utc::now())
    }

    pub fn sync_ignored_at(&self, latest: IgnoreList, now: DateTime<Utc>) -> IgnoreChanges {
        let mut state = self.write();
        let changes = IgnoreChanges {
            added: latest
                .iter()
                .filter(|app| !state.ignored.contains(app))
                .map(String::from)
                .collect(),
            removed: state
                .ignored
                .iter()
                .filter(|app| !latest.contains(app))
                .map(String::from)
                .collect(),
        };
        for app in &changes.removed {
            state.ignored.remove(app);
        }
        for app in &changes.added {
            state.ignored.insert(app.as_str());
            self.close_if_focused(&mut state, app, now);
        }
        changes
    }

    fn close_if_focused(&self, state: &mut State, application_id: &str, now: DateTime<Utc>) {
        let focused = state
            .current
            .as_ref()
            .is_some_and(|s| s.application_id == application_id);
        if focused {
            self.close_current(state, now);
        }
    }

    fn persist_ignored(&self) -> Result<(), IgnoreListError> {
        let _guard = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        let rendered = {
            let state = self.read();
            state
                .ignored
                .path()
                .map(|path| (path.to_path_buf(), state.ignored.render()))
        };
        match rendered {
            Some((path, contents)) => write_rendered(&path, &contents),
            None => Ok(()),
        }
    }

    fn close_current(&self, state: &mut State, end: DateTime<Utc>) {
        let Some(mut session) = state.current.take() else {
            return;
        };
        let end = end.max(session.start_time);
        session.end_time = Some(end);

        let duration = end - session.start_time;
        if duration < self.config.min_duration {
            debug!(
                application_id = %session.application_id,
                duration_ms = duration.num_milliseconds(),
                "discarded short session"
            );
            return;
        }

        if let Some(last) = state.closed.last_mut() {
            let mergeable = last.application_id == session.application_id
                && last
                    .end_time
                    .is_some_and(|last_end| session.start_time - last_end <= self.config.merge_threshold);
            if mergeable {
                last.end_time = Some(end);
                last.window_title = session.window_title;
                debug!(application_id = %last.application_id, "merged session");
                return;
            }
        }

        debug!(
            application_id = %session.application_id,
            duration_ms = duration.num_milliseconds(),
            "session closed"
        );
        state.closed.push(session);
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default(), IgnoreList::default())
    }
}
