//! Pure computations over snapshot history: growth deltas and
//! hour-of-day engagement bucketing.

use autopost_core::Platform;
use chrono::{DateTime, Timelike, Utc};

use crate::types::{GrowthReport, GrowthStats, Snapshot, TimeSlot};

/// Snapshots needed before a delta is meaningful.
pub const MIN_GROWTH_SAMPLES: usize = 2;

/// Maximum distance between a publish time and the snapshot used as its
/// engagement reading.
pub const PAIRING_WINDOW_HOURS: i64 = 6;

/// Compute growth deltas between the first and last snapshot of a window.
///
/// `snapshots` must be ordered by `captured_at` ascending (the store
/// query guarantees this). Below [`MIN_GROWTH_SAMPLES`] the report is
/// `Insufficient`, never a division error.
pub fn growth(snapshots: &[Snapshot]) -> GrowthReport {
    if snapshots.len() < MIN_GROWTH_SAMPLES {
        return GrowthReport::Insufficient {
            samples: snapshots.len(),
        };
    }
    let first = &snapshots[0];
    let last = &snapshots[snapshots.len() - 1];

    let followers_delta = last.followers - first.followers;
    let followers_pct = if first.followers > 0 {
        Some(followers_delta as f64 / first.followers as f64 * 100.0)
    } else {
        None
    };

    let engagement_delta = last.engagement_rate - first.engagement_rate;
    let span_days = (last.captured_at - first.captured_at).num_seconds() as f64 / 86_400.0;
    let engagement_slope_per_day = if span_days > 0.0 {
        engagement_delta / span_days
    } else {
        0.0
    };

    GrowthReport::Computed(GrowthStats {
        followers: last.followers,
        followers_delta,
        followers_pct,
        posts_delta: last.posts_count - first.posts_count,
        engagement_delta,
        engagement_slope_per_day,
        samples: snapshots.len(),
        first_at: first.captured_at,
        last_at: last.captured_at,
    })
}

/// Pair each publish time with the engagement rate of the nearest
/// snapshot within [`PAIRING_WINDOW_HOURS`]. Publishes with no nearby
/// reading are dropped (they carry no signal).
///
/// `snapshots` must be ordered by `captured_at` ascending.
pub fn pair_publishes_with_engagement(
    publish_times: &[DateTime<Utc>],
    snapshots: &[Snapshot],
) -> Vec<(DateTime<Utc>, f64)> {
    let max_gap = chrono::Duration::hours(PAIRING_WINDOW_HOURS);
    publish_times
        .iter()
        .filter_map(|&at| {
            snapshots
                .iter()
                .map(|s| ((s.captured_at - at).abs(), s.engagement_rate))
                .min_by_key(|(gap, _)| *gap)
                .filter(|(gap, _)| *gap <= max_gap)
                .map(|(_, rate)| (at, rate))
        })
        .collect()
}

/// Average engagement per hour-of-day, normalized so the best bucket has
/// confidence 1.0. Hours with no paired publishes are omitted; ties keep
/// the earlier hour first.
pub fn bucket_by_hour(paired: &[(DateTime<Utc>, f64)]) -> Vec<TimeSlot> {
    let mut sums = [0.0f64; 24];
    let mut counts = [0usize; 24];
    for (at, rate) in paired {
        let h = at.hour() as usize;
        sums[h] += rate;
        counts[h] += 1;
    }

    let mut slots: Vec<(u8, f64)> = (0..24)
        .filter(|&h| counts[h] > 0)
        .map(|h| (h as u8, sums[h] / counts[h] as f64))
        .collect();

    let best = slots
        .iter()
        .map(|(_, avg)| *avg)
        .fold(f64::MIN, f64::max);
    slots.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    slots
        .into_iter()
        .map(|(hour, avg)| TimeSlot {
            hour,
            confidence: if best > 0.0 { avg / best } else { 0.0 },
        })
        .collect()
}

/// Static per-platform fallback used until enough publish history exists.
///
/// Hours are UTC, ordered best-first; confidences are fixed ranks, not
/// observed data; the recommendation carries `source: DefaultTable` so
/// callers can tell.
pub fn default_slots(platform: Platform) -> Vec<TimeSlot> {
    let hours: [u8; 4] = match platform {
        Platform::Instagram => [11, 14, 19, 8],
        Platform::Twitter => [9, 12, 17, 21],
        Platform::Tiktok => [19, 21, 12, 16],
    };
    hours
        .iter()
        .enumerate()
        .map(|(i, &hour)| TimeSlot {
            hour,
            confidence: 1.0 - 0.15 * i as f64,
        })
        .collect()
}
