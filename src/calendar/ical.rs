//! Minimal iCal codec for whole-day blocking events.
//!
//! Parsing is deliberately tolerant: feeds from other booking channels vary
//! in what they emit, and a malformed event should drop out quietly rather
//! than block an entire listing. Only `DTSTART`/`DTEND` are consulted; both
//! all-day (`VALUE=DATE`) and timestamped forms are accepted, with `DTEND`
//! exclusive per RFC 5545. A missing `DTEND` means a single blocked night.

use crate::types::{Booking, Listing, date_range};
use chrono::NaiveDate;

/// A half-open run of blocked nights `[start, end)` imported from a feed.
/// `end` is the feed event's checkout boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockedPeriod {
    /// First blocked night.
    pub start: NaiveDate,
    /// Exclusive end (the external reservation's checkout date).
    pub end: NaiveDate,
}

impl BlockedPeriod {
    /// Iterates the blocked nights.
    pub fn nights(&self) -> impl Iterator<Item = NaiveDate> {
        date_range(self.start, self.end)
    }
}

/// Parses an iCal document into blocked periods, skipping events it cannot
/// understand.
#[must_use]
pub fn parse_ical(document: &str) -> Vec<BlockedPeriod> {
    let mut periods = Vec::new();
    let mut in_event = false;
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;

    for line in unfold_lines(document) {
        match line.as_str() {
            "BEGIN:VEVENT" => {
                in_event = true;
                start = None;
                end = None;
            }
            "END:VEVENT" => {
                if let Some(s) = start.take() {
                    let e = end.take().unwrap_or_else(|| {
                        s.checked_add_days(chrono::Days::new(1)).unwrap_or(s)
                    });
                    if s < e {
                        periods.push(BlockedPeriod { start: s, end: e });
                    }
                }
                in_event = false;
            }
            _ if in_event => {
                if let Some(value) = property_value(&line, "DTSTART") {
                    start = parse_ical_date(value);
                } else if let Some(value) = property_value(&line, "DTEND") {
                    end = parse_ical_date(value);
                }
            }
            _ => {}
        }
    }
    periods
}

/// Renders the listing's confirmed bookings as an iCal document with one
/// whole-day `VEVENT` per booking, suitable for import into other channels.
#[must_use]
pub fn export_ical(listing: &Listing, bookings: &[Booking]) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str("PRODID:-//stayhub//reservation calendar//EN\r\n");
    out.push_str("CALSCALE:GREGORIAN\r\n");
    for booking in bookings {
        out.push_str("BEGIN:VEVENT\r\n");
        out.push_str(&format!("UID:{}@stayhub\r\n", booking.id));
        out.push_str(&format!(
            "DTSTART;VALUE=DATE:{}\r\n",
            booking.check_in.format("%Y%m%d")
        ));
        out.push_str(&format!(
            "DTEND;VALUE=DATE:{}\r\n",
            booking.check_out.format("%Y%m%d")
        ));
        out.push_str(&format!("SUMMARY:Reserved - {}\r\n", listing.name));
        out.push_str("END:VEVENT\r\n");
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

/// Joins folded continuation lines (RFC 5545 §3.1: a line starting with
/// whitespace continues the previous one).
fn unfold_lines(document: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in document.lines() {
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest.trim_end_matches('\r'));
                continue;
            }
        }
        lines.push(raw.trim_end_matches('\r').to_string());
    }
    lines
}

/// Extracts the value of `NAME` or `NAME;PARAMS` properties.
fn property_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (head, value) = line.split_once(':')?;
    let prop = head.split(';').next().unwrap_or(head);
    (prop == name).then_some(value)
}

/// Accepts `YYYYMMDD` and `YYYYMMDDTHHMMSS[Z]`, keeping the date part.
fn parse_ical_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()
}
