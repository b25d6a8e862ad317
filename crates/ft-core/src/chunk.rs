//! Splitting summaries that exceed a sink's per-entry cap.

use chrono::Duration;

use crate::aggregate::ActivitySummary;

/// Chunk size used against the time-tracking API's 4 hour entry cap.
pub const CHUNK_SIZE: Duration = Duration::minutes(230);

/// Splits `summary` into pieces of at most `max`.
///
/// Pieces are contiguous, in chronological order, and the last one ends at
/// the summary's `last_seen`. Every piece except the last is exactly `max`
/// long. A non-positive `max` means no cap.
pub fn chunk(summary: &ActivitySummary, max: Duration) -> Vec<ActivitySummary> {
    if max <= Duration::zero() || summary.total_duration <= max {
        return vec![summary.clone()];
    }

    let mut start = summary.last_seen - summary.total_duration;
    let mut remaining = summary.total_duration;
    let mut chunks = Vec::new();
    while remaining > Duration::zero() {
        let length = remaining.min(max);
        chunks.push(ActivitySummary {
            total_duration: length,
            first_seen: start,
            last_seen: start + length,
            ..summary.clone()
        });
        start += length;
        remaining -= length;
    }

    tracing::debug!(
        application_id = %summary.application_id,
        chunks = chunks.len(),
        "split summary"
    );
    chunks
}

/// Applies [`chunk`] to every summary, keeping their order.
pub fn chunk_all<'a, I>(summaries: I, max: Duration) -> Vec<ActivitySummary>
where
    I: IntoIterator<Item = &'a ActivitySummary>,
{
    summaries
        .into_iter()
        .flat_map(|summary| chunk(summary, max))
        .collect()
}
