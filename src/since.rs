use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};

/// 解決済みの"since"パラメータ
///
/// JQLフィルター用の日付と、worklogカーソルの初期値になる
/// エポックミリ秒の両方を保持する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinceDate {
    pub date: NaiveDate,
    pub epoch_ms: i64,
}

impl SinceDate {
    /// JQLの日付リテラル（`YYYY-MM-DD`）
    pub fn jql_date(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// 自由形式の日付表現を解決する
///
/// 受け付ける形式: RFC3339、`YYYY-MM-DD`、`now`/`today`/`yesterday`、
/// `<N> hours/days/weeks/months ago`
pub fn parse_since(input: &str) -> Result<SinceDate> {
    parse_since_at(input, Utc::now()).ok_or_else(|| Error::InvalidSinceDate(input.to_string()))
}

fn parse_since_at(input: &str, now: DateTime<Utc>) -> Option<SinceDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        let utc = datetime.with_timezone(&Utc);
        return Some(SinceDate {
            date: utc.date_naive(),
            epoch_ms: utc.timestamp_millis(),
        });
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(from_date(date));
    }

    match trimmed.to_lowercase().as_str() {
        "now" => {
            return Some(SinceDate {
                date: now.date_naive(),
                epoch_ms: now.timestamp_millis(),
            });
        }
        "today" => return Some(from_date(now.date_naive())),
        "yesterday" => return Some(from_date(now.date_naive().pred_opt()?)),
        _ => {}
    }

    parse_relative(trimmed, now)
}

/// `<N> <unit> ago` 形式の相対表現
fn parse_relative(input: &str, now: DateTime<Utc>) -> Option<SinceDate> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.len() != 3 || !parts[2].eq_ignore_ascii_case("ago") {
        return None;
    }

    let amount: u32 = parts[0].parse().ok()?;
    let resolved = match parts[1].to_lowercase().as_str() {
        "hour" | "hours" => now - Duration::hours(amount as i64),
        "day" | "days" => now - Duration::days(amount as i64),
        "week" | "weeks" => now - Duration::weeks(amount as i64),
        "month" | "months" => now.checked_sub_months(Months::new(amount))?,
        _ => return None,
    };

    Some(SinceDate {
        date: resolved.date_naive(),
        epoch_ms: resolved.timestamp_millis(),
    })
}

fn from_date(date: NaiveDate) -> SinceDate {
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    SinceDate {
        date,
        epoch_ms: midnight.timestamp_millis(),
    }
}
