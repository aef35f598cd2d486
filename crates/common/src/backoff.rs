//! Retry backoff policy.
//!
//! A backoff sequence is an ordered list of delays; the index into the
//! sequence is the number of attempts already made. Once the index runs past
//! the end of the sequence the retry budget is exhausted and no further
//! attempt is scheduled.

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;

/// Default sequence: 5s, 25s, 2m, 10m, 30m, 2h, 6h, 24h.
pub const DEFAULT_BACKOFF_SEQUENCE: &str = "5s,25s,2m,10m,30m,2h,6h,24h";

/// Parse a comma-separated backoff sequence into millisecond delays.
///
/// Each entry is either the compact duration syntax `<int><s|m|h|d>` or a
/// raw millisecond count.
pub fn parse_backoff_sequence(sequence: &str) -> Result<Vec<i64>, AppError> {
    let delays: Result<Vec<i64>, AppError> = sequence
        .split(',')
        .map(|entry| parse_delay_ms(entry.trim()))
        .collect();
    let delays = delays?;

    if delays.is_empty() {
        return Err(AppError::Config(
            "backoff sequence must contain at least one delay".to_string(),
        ));
    }
    Ok(delays)
}

/// Parse one delay entry into milliseconds.
fn parse_delay_ms(entry: &str) -> Result<i64, AppError> {
    if entry.is_empty() {
        return Err(AppError::Config(
            "empty entry in backoff sequence".to_string(),
        ));
    }

    let (value, unit) = match entry.chars().last() {
        Some(c @ ('s' | 'm' | 'h' | 'd')) => (&entry[..entry.len() - 1], Some(c)),
        _ => (entry, None),
    };

    let value: i64 = value.parse().map_err(|_| {
        AppError::Config(format!("invalid backoff entry '{entry}'"))
    })?;

    let ms = match unit {
        Some('s') => value * 1_000,
        Some('m') => value * 60_000,
        Some('h') => value * 3_600_000,
        Some('d') => value * 86_400_000,
        _ => value,
    };

    if ms < 0 {
        return Err(AppError::Config(format!(
            "negative delay in backoff entry '{entry}'"
        )));
    }
    Ok(ms)
}

/// Compute when the next attempt should run.
///
/// Returns `None` once `attempt_count` is at or past the end of the
/// sequence, signalling retry exhaustion.
pub fn next_attempt_time(
    attempt_count: usize,
    sequence: &[i64],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let delay_ms = *sequence.get(attempt_count)?;
    Some(now + Duration::milliseconds(delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_sequence() {
        let seq = parse_backoff_sequence(DEFAULT_BACKOFF_SEQUENCE).unwrap();
        assert_eq!(
            seq,
            vec![
                5_000, 25_000, 120_000, 600_000, 1_800_000, 7_200_000, 21_600_000, 86_400_000
            ]
        );
    }

    #[test]
    fn test_parse_raw_milliseconds() {
        let seq = parse_backoff_sequence("500,1000").unwrap();
        assert_eq!(seq, vec![500, 1000]);
    }

    #[test]
    fn test_parse_mixed_units() {
        let seq = parse_backoff_sequence("30s, 5m ,1h,1d").unwrap();
        assert_eq!(seq, vec![30_000, 300_000, 3_600_000, 86_400_000]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_backoff_sequence("5s,soon").is_err());
        assert!(parse_backoff_sequence("").is_err());
        assert!(parse_backoff_sequence("5s,,10s").is_err());
    }

    #[test]
    fn test_delays_grow_monotonically() {
        let seq = parse_backoff_sequence(DEFAULT_BACKOFF_SEQUENCE).unwrap();
        let now = Utc::now();
        let d0 = next_attempt_time(0, &seq, now).unwrap();
        let d1 = next_attempt_time(1, &seq, now).unwrap();
        let d2 = next_attempt_time(2, &seq, now).unwrap();
        assert!(d0 < d1);
        assert!(d1 < d2);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let seq = parse_backoff_sequence("5s,10s").unwrap();
        let now = Utc::now();
        assert!(next_attempt_time(1, &seq, now).is_some());
        assert!(next_attempt_time(2, &seq, now).is_none());
        assert!(next_attempt_time(99, &seq, now).is_none());
    }
}
