use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, utc.nanosecond())
        .or_else(|| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_default();
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// Calendar year in `tz` at the given instant.
pub fn localized_year(time: OffsetDateTime, tz: Tz) -> i32 {
    localized_datetime(time, tz).year()
}

/// `YYYY/M/D HH:MM:SS`, the zh-CN locale rendering of a timestamp.
pub fn format_generated_at(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz)
        .format("%Y/%-m/%-d %H:%M:%S")
        .to_string()
}
