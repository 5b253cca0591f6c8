//! Birth input captured by the form: a calendar date plus one of the twelve
//! two-hour time slots (*shichen*).
//!
//! Raw submissions arrive as optional strings. [`BirthForm::validate`] turns them
//! into a [`BirthInput`] or reports every offending field at once so the page can
//! mark all of them in a single pass.

use std::{fmt, ops::RangeInclusive, str::FromStr};

use bazi_api_types::GenerateReportRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, Month};

use super::error::DomainError;

pub const DEFAULT_MIN_YEAR: i32 = 1950;

/// The twelve traditional double-hours, in day order starting at 23:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shichen {
    Zi,
    Chou,
    Yin,
    Mao,
    Chen,
    Si,
    Wu,
    Wei,
    Shen,
    You,
    Xu,
    Hai,
}

impl Shichen {
    pub const ALL: [Shichen; 12] = [
        Shichen::Zi,
        Shichen::Chou,
        Shichen::Yin,
        Shichen::Mao,
        Shichen::Chen,
        Shichen::Si,
        Shichen::Wu,
        Shichen::Wei,
        Shichen::Shen,
        Shichen::You,
        Shichen::Xu,
        Shichen::Hai,
    ];

    /// Name sent to the backend and shown in the selector.
    pub fn name(self) -> &'static str {
        match self {
            Shichen::Zi => "子时",
            Shichen::Chou => "丑时",
            Shichen::Yin => "寅时",
            Shichen::Mao => "卯时",
            Shichen::Chen => "辰时",
            Shichen::Si => "巳时",
            Shichen::Wu => "午时",
            Shichen::Wei => "未时",
            Shichen::Shen => "申时",
            Shichen::You => "酉时",
            Shichen::Xu => "戌时",
            Shichen::Hai => "亥时",
        }
    }

    /// Clock range covered by the slot.
    pub fn range(self) -> &'static str {
        match self {
            Shichen::Zi => "23:00-00:59",
            Shichen::Chou => "01:00-02:59",
            Shichen::Yin => "03:00-04:59",
            Shichen::Mao => "05:00-06:59",
            Shichen::Chen => "07:00-08:59",
            Shichen::Si => "09:00-10:59",
            Shichen::Wu => "11:00-12:59",
            Shichen::Wei => "13:00-14:59",
            Shichen::Shen => "15:00-16:59",
            Shichen::You => "17:00-18:59",
            Shichen::Xu => "19:00-20:59",
            Shichen::Hai => "21:00-22:59",
        }
    }
}

impl fmt::Display for Shichen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown time slot `{0}`")]
pub struct UnknownShichen(pub String);

impl FromStr for Shichen {
    type Err = UnknownShichen;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Shichen::ALL
            .into_iter()
            .find(|slot| slot.name() == trimmed)
            .ok_or_else(|| UnknownShichen(trimmed.to_string()))
    }
}

/// Number of days in `month` of `year`, or `None` when the month is out of range.
pub fn days_in_month(year: i32, month: u8) -> Option<u8> {
    Month::try_from(month).ok().map(|month| month.length(year))
}

/// Parse an optional form value, treating blanks as unset.
pub fn parse_selection<T: FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
}

/// Selectable year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormBounds {
    pub min_year: i32,
    pub max_year: i32,
}

impl FormBounds {
    pub fn new(min_year: i32, max_year: i32) -> Self {
        Self { min_year, max_year }
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.min_year..=self.max_year
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years().contains(&year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BirthField {
    Year,
    Month,
    Day,
    Shichen,
}

impl BirthField {
    pub fn as_str(self) -> &'static str {
        match self {
            BirthField::Year => "year",
            BirthField::Month => "month",
            BirthField::Day => "day",
            BirthField::Shichen => "shichen",
        }
    }
}

/// One rejected field together with the message shown beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: BirthField,
    pub message: &'static str,
}

impl FieldError {
    fn new(field: BirthField, message: &'static str) -> Self {
        Self { field, message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "birth input rejected: {}", self.summary())
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn has(&self, field: BirthField) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }

    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|error| format!("{}: {}", error.field.as_str(), error.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl From<ValidationErrors> for DomainError {
    fn from(errors: ValidationErrors) -> Self {
        DomainError::validation(errors.summary())
    }
}

/// Raw form submission. Every field may be absent or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BirthForm {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub shichen: Option<String>,
}

impl BirthForm {
    pub fn new(year: &str, month: &str, day: &str, shichen: &str) -> Self {
        Self {
            year: Some(year.to_string()),
            month: Some(month.to_string()),
            day: Some(day.to_string()),
            shichen: Some(shichen.to_string()),
        }
    }

    /// Check presence, ranges and calendar consistency of all four fields.
    pub fn validate(&self, bounds: &FormBounds) -> Result<BirthInput, ValidationErrors> {
        let mut errors = Vec::new();

        let year = match blank_to_none(self.year.as_deref()) {
            None => {
                errors.push(FieldError::new(BirthField::Year, "请选择出生年份"));
                None
            }
            Some(raw) => match raw.parse::<i32>() {
                Ok(year) if bounds.contains(year) => Some(year),
                Ok(_) => {
                    errors.push(FieldError::new(BirthField::Year, "出生年份超出可选范围"));
                    None
                }
                Err(_) => {
                    errors.push(FieldError::new(BirthField::Year, "出生年份无效"));
                    None
                }
            },
        };

        let month = match blank_to_none(self.month.as_deref()) {
            None => {
                errors.push(FieldError::new(BirthField::Month, "请选择出生月份"));
                None
            }
            Some(raw) => match raw.parse::<u8>() {
                Ok(month) if (1..=12).contains(&month) => Some(month),
                _ => {
                    errors.push(FieldError::new(BirthField::Month, "出生月份无效"));
                    None
                }
            },
        };

        let day = match blank_to_none(self.day.as_deref()) {
            None => {
                errors.push(FieldError::new(BirthField::Day, "请选择出生日期"));
                None
            }
            Some(raw) => match raw.parse::<u8>() {
                Ok(day) if day >= 1 => Some(day),
                _ => {
                    errors.push(FieldError::new(BirthField::Day, "出生日期无效"));
                    None
                }
            },
        };

        if let (Some(year), Some(month), Some(day)) = (year, month, day)
            && days_in_month(year, month).is_some_and(|length| day > length)
        {
            errors.push(FieldError::new(BirthField::Day, "该月份没有这一天"));
        }

        let shichen = match blank_to_none(self.shichen.as_deref()) {
            None => {
                errors.push(FieldError::new(BirthField::Shichen, "请选择出生时辰"));
                None
            }
            Some(raw) => match raw.parse::<Shichen>() {
                Ok(slot) => Some(slot),
                Err(_) => {
                    errors.push(FieldError::new(BirthField::Shichen, "出生时辰无效"));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(ValidationErrors { errors });
        }

        match (year, month, day, shichen) {
            (Some(year), Some(month), Some(day), Some(shichen)) => {
                BirthInput::from_parts(year, month, day, shichen).map_err(|_| ValidationErrors {
                    errors: vec![FieldError::new(BirthField::Day, "该月份没有这一天")],
                })
            }
            _ => Err(ValidationErrors { errors }),
        }
    }
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// A complete, calendar-valid birth moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthInput {
    date: Date,
    shichen: Shichen,
}

impl BirthInput {
    pub fn from_parts(
        year: i32,
        month: u8,
        day: u8,
        shichen: Shichen,
    ) -> Result<Self, DomainError> {
        let month = Month::try_from(month)
            .map_err(|err| DomainError::validation(format!("invalid month: {err}")))?;
        let date = Date::from_calendar_date(year, month, day)
            .map_err(|err| DomainError::validation(format!("invalid date: {err}")))?;
        Ok(Self { date, shichen })
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u8 {
        u8::from(self.date.month())
    }

    pub fn day(&self) -> u8 {
        self.date.day()
    }

    pub fn shichen(&self) -> Shichen {
        self.shichen
    }

    pub fn to_request(&self) -> GenerateReportRequest {
        GenerateReportRequest {
            year: self.year().to_string(),
            month: self.month().to_string(),
            day: self.day().to_string(),
            shichen: self.shichen.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOption {
    pub value: u8,
    pub selected: bool,
}

impl DayOption {
    pub fn label(&self) -> String {
        format!("{}日", self.value)
    }
}

/// Day choices for a given year and month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayOptions {
    pub options: Vec<DayOption>,
    pub selected: Option<u8>,
}

impl DayOptions {
    /// Regenerate the day list. Returns `None` until both year and month are chosen;
    /// a previously chosen day survives only when it still exists in the new month.
    pub fn for_selection(year: Option<i32>, month: Option<u8>, previous: Option<u8>) -> Option<Self> {
        let length = days_in_month(year?, month?)?;
        let selected = previous.filter(|day| (1..=length).contains(day));
        let options = (1..=length)
            .map(|value| DayOption {
                value,
                selected: selected == Some(value),
            })
            .collect();
        Some(Self { options, selected })
    }

    /// Full 1..=31 list used before year and month are known.
    pub fn unconstrained(previous: Option<u8>) -> Self {
        let selected = previous.filter(|day| (1..=31).contains(day));
        let options = (1..=31)
            .map(|value| DayOption {
                value,
                selected: selected == Some(value),
            })
            .collect();
        Self { options, selected }
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn placeholder_selected(&self) -> bool {
        self.selected.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> FormBounds {
        FormBounds::new(1950, 2026)
    }

    #[test]
    fn february_lengths_follow_leap_years() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2000, 2), Some(29));
        assert_eq!(days_in_month(1900, 2), Some(28));
        assert_eq!(days_in_month(2023, 13), None);
    }

    #[test]
    fn day_options_match_calendar_for_every_month() {
        let expected = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        for (index, length) in expected.iter().enumerate() {
            let month = u8::try_from(index + 1).expect("month fits");
            let options = DayOptions::for_selection(Some(2023), Some(month), None)
                .expect("options for complete selection");
            assert_eq!(options.len(), *length as usize, "month {month}");
        }
    }

    #[test]
    fn day_options_keep_previous_day_when_still_valid() {
        let options = DayOptions::for_selection(Some(2024), Some(2), Some(29)).expect("options");
        assert_eq!(options.len(), 29);
        assert_eq!(options.selected, Some(29));
        assert!(options.options[28].selected);
        assert!(!options.placeholder_selected());
    }

    #[test]
    fn day_options_drop_previous_day_when_invalid() {
        let options = DayOptions::for_selection(Some(2023), Some(2), Some(30)).expect("options");
        assert_eq!(options.len(), 28);
        assert_eq!(options.selected, None);
        assert!(options.options.iter().all(|option| !option.selected));
        assert!(options.placeholder_selected());
    }

    #[test]
    fn day_options_wait_for_year_and_month() {
        assert!(DayOptions::for_selection(None, Some(2), Some(1)).is_none());
        assert!(DayOptions::for_selection(Some(2024), None, Some(1)).is_none());
    }

    #[test]
    fn valid_form_produces_input() {
        let form = BirthForm::new("1990", "5", "3", "午时");
        let input = form.validate(&bounds()).expect("valid input");

        assert_eq!(input.year(), 1990);
        assert_eq!(input.month(), 5);
        assert_eq!(input.day(), 3);
        assert_eq!(input.shichen(), Shichen::Wu);
    }

    #[test]
    fn every_missing_field_is_reported() {
        let form = BirthForm {
            year: Some(" ".into()),
            ..BirthForm::default()
        };
        let errors = form.validate(&bounds()).expect_err("empty form rejected");

        assert_eq!(errors.errors().len(), 4);
        assert!(errors.has(BirthField::Year));
        assert!(errors.has(BirthField::Month));
        assert!(errors.has(BirthField::Day));
        assert!(errors.has(BirthField::Shichen));
    }

    #[test]
    fn impossible_dates_are_rejected() {
        let form = BirthForm::new("2023", "2", "29", "子时");
        let errors = form.validate(&bounds()).expect_err("no 29th in 2023-02");
        assert_eq!(errors.errors().len(), 1);
        assert!(errors.has(BirthField::Day));
        assert_eq!(
            errors.to_string(),
            format!("birth input rejected: day: {}", errors.errors()[0].message)
        );

        let leap = BirthForm::new("2024", "2", "29", "子时");
        assert!(leap.validate(&bounds()).is_ok());
    }

    #[test]
    fn out_of_range_year_and_unknown_slot_are_rejected() {
        let form = BirthForm::new("1949", "1", "1", "半夜");
        let errors = form.validate(&bounds()).expect_err("rejected");
        assert!(errors.has(BirthField::Year));
        assert!(errors.has(BirthField::Shichen));
        assert!(!errors.has(BirthField::Day));
    }

    #[test]
    fn request_serializes_fields_faithfully() {
        let input = BirthForm::new("1988", "12", "31", "亥时")
            .validate(&bounds())
            .expect("valid");
        let request = input.to_request();

        assert_eq!(request.year, "1988");
        assert_eq!(request.month, "12");
        assert_eq!(request.day, "31");
        assert_eq!(request.shichen, "亥时");
    }

    #[test]
    fn shichen_round_trips_through_names() {
        for slot in Shichen::ALL {
            assert_eq!(slot.name().parse::<Shichen>(), Ok(slot));
        }
        assert!("午".parse::<Shichen>().is_err());
    }
}
