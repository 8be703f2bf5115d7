// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Time window and hour-boundary helpers

use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::time::Duration;

/// Hours after local midnight covered by one fetch (today plus tomorrow)
pub const FETCH_WINDOW_HOURS: i64 = 47;

/// Start of the local calendar day containing `now`, as a UTC instant
pub fn start_of_local_day(now: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let local_midnight = now
        .with_timezone(&timezone)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();

    // First valid local time at or after midnight; a DST jump can skip midnight itself
    (0..96)
        .find_map(|quarter| {
            timezone
                .from_local_datetime(&(local_midnight + TimeDelta::minutes(15 * quarter)))
                .earliest()
        })
        .map_or(now, |start| start.with_timezone(&Utc))
}

/// Fetch window `[start of today, start of today + 47h]` for the given instant
pub fn fetch_window(now: DateTime<Utc>, timezone: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_local_day(now, timezone);
    (start, start + TimeDelta::hours(FETCH_WINDOW_HOURS))
}

/// Start of the UTC hour containing `now`
pub fn truncate_to_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// Next whole hour strictly after `now`
pub fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_hour(now) + TimeDelta::hours(1)
}

/// Time left until `target`, zero if it already passed
pub fn duration_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// ISO-8601 UTC timestamp with seconds precision and a `Z` suffix, as providers expect
pub fn format_api_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
