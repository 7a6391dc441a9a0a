use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// Timestamp layouts seen in survey-platform exports.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

pub fn parse_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(with_zone) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_zone.naive_local());
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Branch index (1 = Monday .. 7 = Sunday) to weekday.
pub fn branch_weekday(branch: u8) -> Option<Weekday> {
    const WEEK: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    WEEK.get(usize::from(branch).checked_sub(1)?).copied()
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_weekday_name(raw: &str) -> Option<Weekday> {
    raw.trim().parse::<Weekday>().ok()
}

/// The most recent `target` weekday strictly before the completion date
/// ("that day, last week"). Same weekday resolves to seven days back.
pub fn derive_target_date(
    completed_at: Option<NaiveDateTime>,
    target: Option<Weekday>,
) -> Option<NaiveDate> {
    let completed_on = completed_at?.date();
    let target = target?;

    let completion_day = i64::from(completed_on.weekday().num_days_from_monday());
    let target_day = i64::from(target.num_days_from_monday());
    let days_back = match (completion_day - target_day).rem_euclid(7) {
        0 => 7,
        days => days,
    };

    completed_on.checked_sub_signed(Duration::days(days_back))
}
