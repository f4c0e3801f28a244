//! Date, time and duration text forms.
//!
//! Dates and times use ISO 8601. Durations use the `[-]PnDTnHnMn.nS` form,
//! e.g. `P1DT2H30M` or `PT0.25S`.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc,
};

use super::ConvertContext;
use crate::error::ConvertError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn invalid(e: impl std::fmt::Display) -> ConvertError {
    ConvertError::new(e.to_string())
}

pub fn parse_date(text: &str, _cx: &ConvertContext<'_>) -> Result<NaiveDate, ConvertError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(invalid)
}

pub fn format_date(value: &NaiveDate, _cx: &ConvertContext<'_>) -> Option<String> {
    Some(value.format(DATE_FORMAT).to_string())
}

pub fn parse_time(text: &str, _cx: &ConvertContext<'_>) -> Result<NaiveTime, ConvertError> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).map_err(invalid)
}

pub fn format_time(value: &NaiveTime, _cx: &ConvertContext<'_>) -> Option<String> {
    Some(value.format(TIME_FORMAT).to_string())
}

pub fn parse_date_time(
    text: &str,
    _cx: &ConvertContext<'_>,
) -> Result<NaiveDateTime, ConvertError> {
    NaiveDateTime::parse_from_str(text.trim(), DATE_TIME_FORMAT).map_err(invalid)
}

pub fn format_date_time(value: &NaiveDateTime, _cx: &ConvertContext<'_>) -> Option<String> {
    Some(value.format(DATE_TIME_FORMAT).to_string())
}

pub fn parse_utc(text: &str, _cx: &ConvertContext<'_>) -> Result<DateTime<Utc>, ConvertError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(invalid)
}

pub fn format_utc(value: &DateTime<Utc>, _cx: &ConvertContext<'_>) -> Option<String> {
    Some(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

pub fn parse_offset(
    text: &str,
    _cx: &ConvertContext<'_>,
) -> Result<DateTime<FixedOffset>, ConvertError> {
    DateTime::parse_from_rfc3339(text.trim()).map_err(invalid)
}

pub fn format_offset(value: &DateTime<FixedOffset>, _cx: &ConvertContext<'_>) -> Option<String> {
    Some(value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

pub fn format_duration(value: &TimeDelta, _cx: &ConvertContext<'_>) -> Option<String> {
    let negative = *value < TimeDelta::zero();
    let magnitude = if negative { -*value } else { *value };
    let total = magnitude.num_seconds();
    let nanos = magnitude.subsec_nanos();

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || nanos > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds > 0 || nanos > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&seconds.to_string());
            if nanos > 0 {
                let fraction = format!("{:09}", nanos);
                out.push('.');
                out.push_str(fraction.trim_end_matches('0'));
            }
            out.push('S');
        }
    }
    Some(out)
}

/// Splits `12H30M1.5S` into `[("12", 'H'), ("30", 'M'), ("1.5", 'S')]`.
fn components(part: &str) -> Result<Vec<(&str, char)>, ConvertError> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, c) in part.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        let number = &part[start..idx];
        if number.is_empty() {
            return Err(ConvertError::new(format!("missing number before '{}'", c)));
        }
        out.push((number, c));
        start = idx + c.len_utf8();
    }
    if start != part.len() {
        return Err(ConvertError::new("duration component without unit"));
    }
    Ok(out)
}

fn whole(number: &str) -> Result<i64, ConvertError> {
    number.parse::<i64>().map_err(invalid)
}

pub fn parse_duration(text: &str, _cx: &ConvertContext<'_>) -> Result<TimeDelta, ConvertError> {
    let text = text.trim();
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest
        .strip_prefix('P')
        .ok_or_else(|| ConvertError::new("duration must start with 'P'"))?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.map_or(true, str::is_empty) {
        return Err(ConvertError::new("empty duration"));
    }

    let overflow = || ConvertError::new("duration out of range");
    let mut seconds: i64 = 0;
    let mut nanos: u32 = 0;

    for (number, unit) in components(date_part)? {
        let factor = match unit {
            'W' => 604_800,
            'D' => 86_400,
            other => return Err(ConvertError::new(format!("unexpected unit '{}'", other))),
        };
        seconds = whole(number)?
            .checked_mul(factor)
            .and_then(|s| seconds.checked_add(s))
            .ok_or_else(overflow)?;
    }

    for (number, unit) in components(time_part.unwrap_or(""))? {
        let factor = match unit {
            'H' => 3_600,
            'M' => 60,
            'S' => 1,
            other => return Err(ConvertError::new(format!("unexpected unit '{}'", other))),
        };
        let (int_part, fraction) = match number.split_once('.') {
            Some((int_part, fraction)) if unit == 'S' => (int_part, Some(fraction)),
            Some(_) => return Err(ConvertError::new("only seconds may be fractional")),
            None => (number, None),
        };
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        seconds = whole(int_part)?
            .checked_mul(factor)
            .and_then(|s| seconds.checked_add(s))
            .ok_or_else(overflow)?;
        if let Some(fraction) = fraction {
            let digits: String = fraction.chars().take(9).collect();
            nanos = format!("{:0<9}", digits).parse::<u32>().map_err(invalid)?;
        }
    }

    let magnitude = TimeDelta::new(seconds, nanos).ok_or_else(overflow)?;
    Ok(if negative { -magnitude } else { magnitude })
}
