// ABOUTME: Parsing and formatting of token time-to-live values
// ABOUTME: Accepts ISO-8601 durations, unit-suffixed values and bare seconds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Time-to-live values are stored as ISO-8601 strings (`PT1H`, `PT5M`).
//! Older rows and hand-written configuration may use `30m`, `3600s` or a
//! bare number of seconds; all of these parse.

use chrono::Duration;

use crate::errors::{AppError, AppResult};

/// Parse a stored duration
///
/// # Errors
///
/// Returns an error if the value is not a recognised duration
pub fn parse_duration(value: &str) -> AppResult<Duration> {
    let trimmed = value.trim();
    let invalid = || AppError::invalid_input(format!("Invalid duration: '{value}'"));

    if trimmed.is_empty() {
        return Err(invalid());
    }
    if trimmed.starts_with(['P', 'p']) {
        return parse_iso8601(&trimmed[1..]).ok_or_else(invalid);
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(Duration::seconds(seconds));
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = trimmed.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    match unit.to_lowercase().as_str() {
        "ms" => Ok(Duration::milliseconds(amount)),
        "s" => Ok(Duration::seconds(amount)),
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        _ => Err(invalid()),
    }
}

/// Parse the part of an ISO-8601 duration after the leading `P`
fn parse_iso8601(body: &str) -> Option<Duration> {
    let upper = body.to_uppercase();
    let (date_part, time_part) = match upper.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (upper.as_str(), None),
    };

    let mut total = Duration::zero();
    let mut seen_component = false;

    for (amount, designator) in components(date_part)? {
        let whole = amount.parse::<i64>().ok()?;
        total += match designator {
            'W' => Duration::weeks(whole),
            'D' => Duration::days(whole),
            _ => return None,
        };
        seen_component = true;
    }

    if let Some(time_part) = time_part {
        for (amount, designator) in components(time_part)? {
            total += match designator {
                'H' => Duration::hours(amount.parse::<i64>().ok()?),
                'M' => Duration::minutes(amount.parse::<i64>().ok()?),
                'S' => fractional_seconds(&amount)?,
                _ => return None,
            };
            seen_component = true;
        }
    }

    seen_component.then_some(total)
}

/// Split `1H30M` into `[("1", 'H'), ("30", 'M')]`
fn components(part: &str) -> Option<Vec<(String, char)>> {
    let mut result = Vec::new();
    let mut amount = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == '-' {
            amount.push(c);
        } else {
            if amount.is_empty() {
                return None;
            }
            result.push((std::mem::take(&mut amount), c));
        }
    }
    amount.is_empty().then_some(result)
}

fn fractional_seconds(amount: &str) -> Option<Duration> {
    match amount.split_once('.') {
        None => Some(Duration::seconds(amount.parse().ok()?)),
        Some((whole, fraction)) => {
            let millis: String = fraction.chars().chain("000".chars()).take(3).collect();
            let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
            Some(Duration::seconds(whole) + Duration::milliseconds(millis.parse().ok()?))
        }
    }
}

/// Format a duration as ISO-8601, e.g. `PT1H30M`
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total_millis = duration.num_milliseconds();
    if total_millis == 0 {
        return "PT0S".to_owned();
    }

    let sign = if total_millis < 0 { "-" } else { "" };
    let total_millis = total_millis.abs();
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let seconds = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{sign}{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{sign}{minutes}M"));
    }
    if seconds > 0 || millis > 0 {
        if millis > 0 {
            let fraction = format!("{millis:03}");
            out.push_str(&format!(
                "{sign}{seconds}.{}S",
                fraction.trim_end_matches('0')
            ));
        } else {
            out.push_str(&format!("{sign}{seconds}S"));
        }
    }
    out
}
