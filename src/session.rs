use chrono::{Days, Duration, NaiveDateTime, NaiveTime};

/// Daily trading-session wall-clock bounds, identical for every trading
/// day. No holiday calendar is modeled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSession {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for MarketSession {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
        }
    }
}

impl MarketSession {
    /// Half-open membership check: `[open, close)`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.open && time < self.close
    }
}

/// Maps a base timestamp plus a step offset onto the next valid
/// trading-session instant.
///
/// Every step is projected independently from the *original* base, not
/// chained from the previous projected step; multi-step sequences near the
/// session close can therefore produce non-monotonic or duplicate
/// timestamps. That matches the observed behavior of the system this
/// engine replaces and is kept as-is.
#[derive(Debug, Clone, Copy)]
pub struct TimestampProjector {
    session: MarketSession,
    step: Duration,
}

impl Default for TimestampProjector {
    fn default() -> Self {
        Self {
            session: MarketSession::default(),
            step: Duration::minutes(5),
        }
    }
}

impl TimestampProjector {
    pub fn new(session: MarketSession, step: Duration) -> Self {
        Self { session, step }
    }

    pub fn session(&self) -> MarketSession {
        self.session
    }

    /// Projects `base + k * step` (with `k` 1-based) onto the session:
    /// at or past the close rolls to the *next* calendar day's open,
    /// discarding the overshoot; before the open clamps forward to the same
    /// day's open; inside the session the candidate is kept unchanged.
    ///
    /// The result is always within `[open, close)` and never before the
    /// input day.
    pub fn project(&self, base: NaiveDateTime, k: u32) -> NaiveDateTime {
        let candidate = base + self.step * k as i32;
        let time = candidate.time();

        if time >= self.session.close {
            (candidate.date() + Days::new(1)).and_time(self.session.open)
        } else if time < self.session.open {
            candidate.date().and_time(self.session.open)
        } else {
            candidate
        }
    }
}
