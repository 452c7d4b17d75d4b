use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};

use crate::error::DateFormatError;
use crate::ticket_pdf::TicketRecord;

/// Tickets whose passenger name sits within this edit distance of the
/// reference name are grouped as the primary passenger's.
const NAME_DISTANCE_THRESHOLD: usize = 5;

// Month abbreviations as printed on the vendor's tickets.
const MONTHS: &[(&str, &str)] = &[
    ("ENE", "01"),
    ("FEB", "02"),
    ("MAR", "03"),
    ("ABR", "04"),
    ("MAY", "05"),
    ("JUN", "06"),
    ("JUL", "07"),
    ("AGO", "08"),
    ("SEP", "09"),
    ("OCT", "10"),
    ("NOV", "11"),
    ("DIC", "12"),
];

/// Civil timezone all ticket dates and job schedules are interpreted in.
/// Mexico City stopped observing DST, so a fixed offset is exact.
pub fn mexico_city_offset() -> FixedOffset {
    FixedOffset::west_opt(6 * 3600).expect("valid utc offset")
}

/// Resolve a vendor date string ("02 ENE 24") to the first instant of that
/// civil day.
pub fn parse_travel_date(raw: &str) -> Result<DateTime<FixedOffset>, DateFormatError> {
    let abbrev = raw
        .split(' ')
        .nth(1)
        .ok_or_else(|| DateFormatError::UnknownMonth(raw.to_string()))?;
    let number = MONTHS
        .iter()
        .find(|(name, _)| *name == abbrev)
        .map(|(_, number)| *number)
        .ok_or_else(|| DateFormatError::UnknownMonth(raw.to_string()))?;
    let normalized = raw.replace(abbrev, number);
    let date = NaiveDate::parse_from_str(&normalized, "%d %m %y")?;
    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight exists");
    Ok(mexico_city_offset()
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offset is unambiguous"))
}

fn first_instant_of_month(year: i32, month: u32) -> DateTime<FixedOffset> {
    let date = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight exists");
    mexico_city_offset()
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offset is unambiguous")
}

/// Half-open window covering exactly the calendar month before the one
/// holding `reference`: `[first instant of previous month, first instant of
/// reference month)`.
pub fn trailing_month_window(
    reference: DateTime<FixedOffset>,
) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    let end = first_instant_of_month(reference.year(), reference.month());
    let (year, month) = if reference.month() == 1 {
        (reference.year() - 1, 12)
    } else {
        (reference.year(), reference.month() - 1)
    };
    (first_instant_of_month(year, month), end)
}

/// Partition tickets into the primary passenger's group and everyone else's,
/// silently dropping tickets outside the trailing month window.
pub fn split_tickets(
    tickets: Vec<TicketRecord>,
    reference: DateTime<FixedOffset>,
    primary_name: &str,
) -> Result<(Vec<TicketRecord>, Vec<TicketRecord>), DateFormatError> {
    let (start, end) = trailing_month_window(reference);
    let mut primary = Vec::new();
    let mut other = Vec::new();
    for ticket in tickets {
        let travel = parse_travel_date(&ticket.travel_date)?;
        if travel < start || travel >= end {
            continue;
        }
        if levenshtein_distance(&ticket.passenger_name, primary_name) <= NAME_DISTANCE_THRESHOLD {
            primary.push(ticket);
        } else {
            other.push(ticket);
        }
    }
    Ok((primary, other))
}

/// Minimum number of single-character insertions, deletions and
/// substitutions turning one string into the other. Vendor names carry OCR
/// noise and dropped accents, so exact comparison is useless here.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
