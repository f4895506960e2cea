use time::OffsetDateTime;

/// Source of wall-clock time.
///
/// Credential validity is judged against this rather than calling
/// `OffsetDateTime::now_utc` directly, so expiry can be driven from tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
