//! Range tokens to timezone-correct time windows.
//!
//! A range token is the short string a dashboard query carries (`12w`, `7d`,
//! `ytd`, `all`). Windows are computed in the domain's own civil calendar so
//! that day boundaries and business days match local wall-clock time.
//!
//! | Token | Start | End |
//! |-------|-------|-----|
//! | `all` | unbounded | unbounded |
//! | `ytd` | Jan 1 of the current local year | now |
//! | `13w` | first day of the quarter three quarters before the current one | now |
//! | `<N>d` | midnight of the N-th business day counting back from yesterday | now |
//! | `<N>w` | midnight of (now - N weeks) | now |
//!
//! Anything else resolves to an unbounded window; resolution never fails.

use crate::types::{Domain, TimeWindow};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Upper bound on `N` for `<N>d` / `<N>w` tokens; larger values fail open.
const MAX_RANGE_UNITS: u32 = 520;

/// Parsed form of a range token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    All,
    YearToDate,
    /// The `13w` token: last four calendar quarters including the current one
    Quarterly,
    BusinessDays(u32),
    Weeks(u32),
}

impl RangeSpec {
    /// Parse a token. Unrecognized tokens yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        match token.as_str() {
            "" | "all" => return Some(RangeSpec::All),
            "ytd" => return Some(RangeSpec::YearToDate),
            "13w" => return Some(RangeSpec::Quarterly),
            _ => {}
        }

        let (digits, make): (&str, fn(u32) -> RangeSpec) =
            if let Some(digits) = token.strip_suffix('d') {
                (digits, RangeSpec::BusinessDays)
            } else if let Some(digits) = token.strip_suffix('w') {
                (digits, RangeSpec::Weeks)
            } else {
                return None;
            };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u32 = digits.parse().ok()?;
        if n == 0 || n > MAX_RANGE_UNITS {
            return None;
        }
        Some(make(n))
    }
}

/// Resolves range tokens into windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindowResolver;

impl TimeWindowResolver {
    /// Resolve a token against the current instant.
    pub fn resolve(range_token: &str, domain: Domain) -> TimeWindow {
        let tz = domain.timezone();
        Self::resolve_at(range_token, domain, Utc::now().with_timezone(&tz))
    }

    /// Resolve a token against a fixed `now`.
    pub fn resolve_at(range_token: &str, domain: Domain, now: DateTime<Tz>) -> TimeWindow {
        let tz = domain.timezone();
        let now = now.with_timezone(&tz);

        let Some(spec) = RangeSpec::parse(range_token) else {
            tracing::debug!(range = range_token, %domain, "Unrecognized range token, using unbounded window");
            return TimeWindow::unbounded(tz);
        };

        let start = match spec {
            RangeSpec::All => return TimeWindow::unbounded(tz),
            RangeSpec::YearToDate => NaiveDate::from_ymd_opt(now.year(), 1, 1),
            RangeSpec::Quarterly => quarter_start_back(now.date_naive(), 3),
            RangeSpec::BusinessDays(n) => Some(business_days_back(now.date_naive(), n)),
            RangeSpec::Weeks(n) => Some((now - Duration::weeks(i64::from(n))).date_naive()),
        };

        match start.and_then(|day| local_midnight(&tz, day)) {
            Some(start) if start <= now => TimeWindow::until_now(start, now),
            _ => {
                tracing::warn!(range = range_token, %domain, "Could not place window start, using unbounded window");
                TimeWindow::unbounded(tz)
            }
        }
    }
}

/// First day of the calendar quarter `back` quarters before the one containing `today`.
pub fn quarter_start_back(today: NaiveDate, back: u32) -> Option<NaiveDate> {
    // Quarters counted from year 0 so subtraction wraps across years.
    let current = today.year() * 4 + (today.month0() / 3) as i32;
    let target = current - back as i32;
    let year = target.div_euclid(4);
    let quarter = target.rem_euclid(4) as u32;
    NaiveDate::from_ymd_opt(year, quarter * 3 + 1, 1)
}

/// Walk back from the day before `today`, counting only Mon-Fri, until `n`
/// business days have been counted. Returns the last day counted.
pub fn business_days_back(today: NaiveDate, n: u32) -> NaiveDate {
    let mut day = today;
    let mut counted = 0;
    while counted < n {
        day = day.pred_opt().unwrap_or(day);
        if is_business_day(day) {
            counted += 1;
        }
    }
    day
}

pub fn is_business_day(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Midnight of `day` in `tz`, or the first valid instant after it when
/// midnight falls inside a DST gap.
fn local_midnight(tz: &Tz, day: NaiveDate) -> Option<DateTime<Tz>> {
    let midnight = day.and_hms_opt(0, 0, 0)?;
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => match tz.from_local_datetime(&(midnight + Duration::hours(1))) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        },
    }
}
