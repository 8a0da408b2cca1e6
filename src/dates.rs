use chrono::{Days, Local, NaiveDate};

use crate::error::ValidationError;

/// Wire format the service expects for dates.
pub const WIRE_DATE_FORMAT: &str = "%m-%d-%Y";

/// Inclusive date range, `start <= end` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.format(WIRE_DATE_FORMAT).to_string(),
                end: end.format(WIRE_DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parses two `MM-DD-YYYY` dates.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(parse_wire_date(start)?, parse_wire_date(end)?)
    }

    /// The `days` days leading up to and including `today`.
    pub fn days_before(today: NaiveDate, days: u64) -> Self {
        let start = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// The last `days` days ending today (local time).
    pub fn last_days(days: u64) -> Self {
        Self::days_before(Local::now().date_naive(), days)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub(crate) fn to_wire(self) -> WireDates {
        WireDates {
            start_date: self.start.format(WIRE_DATE_FORMAT).to_string(),
            end_date: self.end.format(WIRE_DATE_FORMAT).to_string(),
            recurring: false,
        }
    }
}

fn parse_wire_date(text: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = text.trim();
    // %m/%d accept unpadded digits; the wire contract is zero-padded
    if trimmed.len() != 10 {
        return Err(ValidationError::InvalidDate(text.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, WIRE_DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(text.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDates {
    pub(crate) start_date: String,
    pub(crate) end_date: String,
    pub(crate) recurring: bool,
}
