use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

/// Shifts `time` to the wall-clock offset `tz` observes at that instant.
pub fn localize(time: OffsetDateTime, tz: Tz) -> OffsetDateTime {
    let utc = DateTime::<Utc>::from_timestamp(time.unix_timestamp(), 0).unwrap_or_default();
    let seconds = tz
        .offset_from_utc_datetime(&utc.naive_utc())
        .fix()
        .local_minus_utc();

    UtcOffset::from_whole_seconds(seconds)
        .ok()
        .and_then(|offset| time.checked_to_offset(offset))
        .unwrap_or(time)
}
