use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::CatalogError;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const ORDINALS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];

/// Which occurrence inside the anchor month is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ordinal {
    Nth(u32),
    Last,
}

/// What the ordinal counts: whole weeks of the month, or a given weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorUnit {
    Week,
    Weekday(Weekday),
}

/// A yearly calendar anchor such as "first week of october" or
/// "last sunday of march". Serialized in its human-readable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeasonalAnchor {
    month: u32,
    ordinal: Ordinal,
    unit: AnchorUnit,
}

impl SeasonalAnchor {
    pub fn new(month: u32, ordinal: Ordinal, unit: AnchorUnit) -> Result<Self, CatalogError> {
        if !(1..=12).contains(&month) {
            return Err(CatalogError::MalformedAnchor(format!(
                "month {month} is out of range"
            )));
        }
        match (ordinal, unit) {
            (Ordinal::Nth(n), AnchorUnit::Week) if !(1..=4).contains(&n) => {
                return Err(CatalogError::MalformedAnchor(format!(
                    "week ordinal {n} must be between 1 and 4"
                )));
            }
            (Ordinal::Nth(n), AnchorUnit::Weekday(_)) if !(1..=4).contains(&n) => {
                // a fifth weekday does not exist in every month
                return Err(CatalogError::MalformedAnchor(format!(
                    "weekday ordinal {n} must be between 1 and 4"
                )));
            }
            _ => {}
        }
        Ok(Self {
            month,
            ordinal,
            unit,
        })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The anchor date within `year`.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        match (self.unit, self.ordinal) {
            (AnchorUnit::Week, Ordinal::Nth(n)) => {
                NaiveDate::from_ymd_opt(year, self.month, 1 + (n - 1) * 7)
            }
            (AnchorUnit::Week, Ordinal::Last) => {
                last_day_of_month(year, self.month).map(|d| d - Duration::days(6))
            }
            (AnchorUnit::Weekday(weekday), Ordinal::Nth(n)) => {
                nth_weekday(year, self.month, weekday, n)
            }
            (AnchorUnit::Weekday(weekday), Ordinal::Last) => {
                last_weekday(year, self.month, weekday)
            }
        }
    }

    /// First anchor date on or after `from`.
    pub fn next_on_or_after(&self, from: NaiveDate) -> Option<NaiveDate> {
        let this_year = self.in_year(from.year())?;
        if this_year >= from {
            return Some(this_year);
        }
        self.in_year(from.year() + 1)
    }
}

impl fmt::Display for SeasonalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ordinal = match self.ordinal {
            Ordinal::Nth(n) => ORDINALS[(n - 1) as usize],
            Ordinal::Last => "last",
        };
        let unit = match self.unit {
            AnchorUnit::Week => "week".to_string(),
            AnchorUnit::Weekday(weekday) => weekday_name(weekday).to_string(),
        };
        write!(
            f,
            "{ordinal} {unit} of {}",
            MONTHS[(self.month - 1) as usize]
        )
    }
}

impl FromStr for SeasonalAnchor {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let parts: Vec<&str> = normalized.split_whitespace().collect();
        let [ordinal, unit, "of", month] = parts.as_slice() else {
            return Err(CatalogError::MalformedAnchor(format!(
                "expected '<ordinal> <week|weekday> of <month>', got '{s}'"
            )));
        };

        let ordinal = if *ordinal == "last" {
            Ordinal::Last
        } else {
            ORDINALS
                .iter()
                .position(|name| name == ordinal)
                .map(|idx| Ordinal::Nth(idx as u32 + 1))
                .ok_or_else(|| CatalogError::MalformedAnchor(format!("unknown ordinal '{ordinal}'")))?
        };

        let unit = if *unit == "week" {
            AnchorUnit::Week
        } else {
            AnchorUnit::Weekday(
                unit.parse::<Weekday>()
                    .map_err(|_| CatalogError::MalformedAnchor(format!("unknown weekday '{unit}'")))?,
            )
        };

        let month = MONTHS
            .iter()
            .position(|name| name == month)
            .map(|idx| idx as u32 + 1)
            .ok_or_else(|| CatalogError::MalformedAnchor(format!("unknown month '{month}'")))?;

        SeasonalAnchor::new(month, ordinal, unit)
    }
}

impl TryFrom<String> for SeasonalAnchor {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeasonalAnchor> for String {
    fn from(anchor: SeasonalAnchor) -> Self {
        anchor.to_string()
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(first_of_next - Duration::days(1))
}

/// Find the nth occurrence of a weekday in a month
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> Option<NaiveDate> {
    let mut date = NaiveDate::from_ymd_opt(year, month, 1)?;
    let mut count = 0;

    while date.month() == month {
        if date.weekday() == weekday {
            count += 1;
            if count == n {
                return Some(date);
            }
        }
        date = date + Duration::days(1);
    }
    None
}

/// Find the last occurrence of a weekday in a month
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let mut date = last_day_of_month(year, month)?;
    while date.weekday() != weekday {
        date = date - Duration::days(1);
    }
    Some(date)
}
