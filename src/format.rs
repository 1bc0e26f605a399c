//! Human-readable renderings of millisecond durations.

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// `HH:MM:SS` for the running timer. Negative input is shown by magnitude.
pub fn format_clock(ms: i64) -> String {
    let ms = ms.unsigned_abs();
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// `H:MM` for lifetime totals.
pub fn format_total(ms: i64) -> String {
    let ms = ms.unsigned_abs();
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    format!("{hours}:{minutes:02}")
}

pub fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(MS_PER_MINUTE)
}

pub fn ms_to_minutes(ms: u64) -> u64 {
    ms / MS_PER_MINUTE
}
