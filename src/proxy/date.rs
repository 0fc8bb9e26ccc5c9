//! HTTP dates for `Date` and `Warning` headers.
//!
//! Dates are written in RFC 1123 form. Parsing also accepts the obsolete
//! RFC 850 and asctime forms, which are normalised to RFC 1123 first.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const RFC1123: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// The weekday is not checked when parsing.
const RFC1123_NO_WEEKDAY: &[BorrowedFormatItem<'static>] =
    format_description!("[day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

/// Format an instant as `Tue, 01 Jan 2020 00:00:00 GMT`.
pub fn format_http_date(instant: OffsetDateTime) -> String {
    instant
        .to_offset(time::UtcOffset::UTC)
        .format(RFC1123)
        .unwrap_or_default()
}

/// Parse an HTTP date in any of its three forms. The weekday name must be
/// present but is not checked against the date.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    let normalized = match value.split_once(", ") {
        Some((_, rest)) if rest.contains('-') => from_rfc850(rest)?,
        Some((_, rest)) => rest.to_string(),
        None => from_asctime(value)?,
    };
    PrimitiveDateTime::parse(&normalized, RFC1123_NO_WEEKDAY)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// `06-Nov-94 08:49:37 GMT` → `06 Nov 1994 08:49:37 GMT`.
///
/// Two-digit years below 70 belong to the 2000s.
fn from_rfc850(rest: &str) -> Option<String> {
    let (date, clock) = rest.split_once(' ')?;
    let mut fields = date.split('-');
    let (day, month, year) = (fields.next()?, fields.next()?, fields.next()?);
    if year.len() != 2 || fields.next().is_some() {
        return None;
    }
    let short: u16 = year.parse().ok()?;
    let year = if short < 70 { 2000 + short } else { 1900 + short };
    Some(format!("{day} {month} {year} {clock}"))
}

/// `Sun Nov  6 08:49:37 1994` → `06 Nov 1994 08:49:37 GMT`.
fn from_asctime(value: &str) -> Option<String> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let [_weekday, month, day, clock, year] = fields.as_slice() else {
        return None;
    };
    let day: u8 = day.parse().ok()?;
    Some(format!("{day:02} {month} {year} {clock} GMT"))
}

/// Extract the date of a `Warning` value shaped
/// `<code> <agent> "<text>" "<date>"`.
pub fn warning_date(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    let mut fields = value.splitn(3, ' ');
    let code = fields.next()?;
    let _agent = fields.next()?;
    let quoted = fields.next()?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let body = quoted.strip_suffix('"')?;
    let (text, date) = body.rsplit_once('"')?;
    if !text.trim_end().ends_with('"') || !text.starts_with('"') {
        return None;
    }
    parse_http_date(date)
}
