use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};

/// Parses the due field of the add/edit form into a concrete instant.
///
/// Grammar: `<date> [time]` or a bare `<time>` (meaning today). Dates may be
/// explicit (`2026-03-02`), keywords (`today`, `tomorrow`), offsets (`+3d`,
/// `+2w`, `+1m`), or weekday names (`fri`, `next mon`). Times are `HH:MM`;
/// a date without a time falls to end of day.
pub fn parse_due_input(input: &str, base: NaiveDate) -> Option<NaiveDateTime> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    let (date_part, time_part) = split_date_and_time(&trimmed);

    let time = match time_part {
        Some(raw) => parse_time(raw)?,
        None => end_of_day(),
    };

    let date = match date_part {
        Some(raw) => parse_date_token(raw, base)?,
        None => base,
    };

    Some(date.and_time(time))
}

/// Normalizes a locally-entered due instant to UTC. `None` only for local
/// times skipped by a DST transition.
pub fn to_utc(local: NaiveDateTime) -> Option<DateTime<Utc>> {
    let resolved: DateTime<Local> = Local.from_local_datetime(&local).earliest()?;
    Some(resolved.with_timezone(&Utc))
}

fn split_date_and_time(input: &str) -> (Option<&str>, Option<&str>) {
    match input.rsplit_once(' ') {
        Some((head, tail)) if looks_like_time(tail) => {
            let head = head.trim();
            if head.is_empty() {
                (None, Some(tail))
            } else {
                (Some(head), Some(tail))
            }
        }
        _ => {
            if looks_like_time(input) {
                (None, Some(input))
            } else {
                (Some(input), None)
            }
        }
    }
}

fn looks_like_time(token: &str) -> bool {
    token.contains(':') && token.chars().all(|c| c.is_ascii_digit() || c == ':')
}

fn parse_date_token(token: &str, base: NaiveDate) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some(date);
    }

    match token {
        "today" => return Some(base),
        "tomorrow" => return Some(base + Duration::days(1)),
        _ => {}
    }

    if let Some(date) = parse_relative_offset(token, base) {
        return Some(date);
    }

    parse_weekday_input(token, base)
}

fn parse_time(token: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let hour: u32 = parts[0].parse().ok()?;
    let minute: u32 = parts[1].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default()
}

fn parse_relative_offset(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let rest = input.strip_prefix('+').unwrap_or(input);
    let unit = rest.chars().last()?;
    let digits = &rest[..rest.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let qty: i64 = digits.parse().ok()?;

    match unit {
        'd' => Some(base + Duration::days(qty)),
        'w' => Some(base + Duration::weeks(qty)),
        'm' => Some(add_months(base, qty as i32)),
        _ => None,
    }
}

fn parse_weekday_input(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    match parts.as_slice() {
        [token] => {
            let weekday = parse_weekday(token)?;
            Some(next_weekday(base, weekday, false))
        }
        ["next", token] => {
            let weekday = parse_weekday(token)?;
            Some(next_weekday(base, weekday, true))
        }
        _ => None,
    }
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    if token.starts_with("mon") {
        Some(Weekday::Mon)
    } else if token.starts_with("tue") {
        Some(Weekday::Tue)
    } else if token.starts_with("wed") {
        Some(Weekday::Wed)
    } else if token.starts_with("thu") {
        Some(Weekday::Thu)
    } else if token.starts_with("fri") {
        Some(Weekday::Fri)
    } else if token.starts_with("sat") {
        Some(Weekday::Sat)
    } else if token.starts_with("sun") {
        Some(Weekday::Sun)
    } else {
        None
    }
}

fn next_weekday(base: NaiveDate, weekday: Weekday, force_next: bool) -> NaiveDate {
    let base_num = base.weekday().num_days_from_monday() as i32;
    let target_num = weekday.num_days_from_monday() as i32;
    let mut delta = (target_num - base_num + 7) % 7;
    if force_next && delta == 0 {
        delta = 7;
    }
    base + Duration::days(delta as i64)
}

fn add_months(base: NaiveDate, months: i32) -> NaiveDate {
    let total = base.year() * 12 + (base.month() as i32 - 1) + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12) + 1) as u32;
    let last_day = last_day_of_month(year, month);
    let day = base.day().min(last_day);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(base)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).unwrap());
    (first_next - Duration::days(1)).day()
}
