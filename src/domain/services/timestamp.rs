use crate::utils::error::{EtlError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// 判斷字串是否為時間的版型設定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TimestampLayout {
    #[default]
    Rfc3339,
    Rfc2822,
    /// chrono strftime 格式，例如 `%Y-%m-%d %H:%M:%S`
    Pattern(String),
}

impl TimestampLayout {
    /// 解析成功時回傳 Unix 微秒
    pub fn parse_micros(&self, value: &str) -> Option<i64> {
        match self {
            TimestampLayout::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.timestamp_micros()),
            TimestampLayout::Rfc2822 => DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|dt| dt.timestamp_micros()),
            TimestampLayout::Pattern(pattern) => parse_with_pattern(value, pattern),
        }
    }
}

fn parse_with_pattern(value: &str, pattern: &str) -> Option<i64> {
    // 依序嘗試：帶時區 → 無時區 (視為 UTC) → 只有日期
    if let Ok(dt) = DateTime::parse_from_str(value, pattern) {
        return Some(dt.timestamp_micros());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
        return Some(naive.and_utc().timestamp_micros());
    }
    NaiveDate::parse_from_str(value, pattern)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_micros())
}

impl FromStr for TimestampLayout {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("rfc3339") {
            return Ok(TimestampLayout::Rfc3339);
        }
        if trimmed.eq_ignore_ascii_case("rfc2822") {
            return Ok(TimestampLayout::Rfc2822);
        }

        let invalid = |reason: &str| EtlError::InvalidConfigValueError {
            field: "timestamp_format".to_string(),
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if !trimmed.contains('%') {
            return Err(invalid(
                "Expected 'rfc3339', 'rfc2822' or a strftime pattern such as '%Y-%m-%d %H:%M:%S'",
            ));
        }
        if StrftimeItems::new(trimmed).any(|item| matches!(item, Item::Error)) {
            return Err(invalid("Pattern contains an unknown strftime specifier"));
        }

        Ok(TimestampLayout::Pattern(trimmed.to_string()))
    }
}

impl fmt::Display for TimestampLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampLayout::Rfc3339 => f.write_str("rfc3339"),
            TimestampLayout::Rfc2822 => f.write_str("rfc2822"),
            TimestampLayout::Pattern(p) => f.write_str(p),
        }
    }
}
