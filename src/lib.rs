pub mod bot;
pub mod config;
pub mod gateway;
pub mod relay;
pub mod store;

pub type AppResult<T> = Result<T, anyhow::Error>;

/// Current wall-clock time in milliseconds, same resolution as Signal
/// message timestamps.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
