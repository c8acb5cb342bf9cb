pub mod album;
pub mod photo;
pub mod user;

use time::OffsetDateTime;

/// Current time truncated to microseconds, the precision Postgres keeps for
/// `timestamptz`, so a returned record equals the stored one.
pub fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}
