//! Time source abstraction
//!
//! Calling windows and retry dates are all evaluated in UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// First date a failed attempt may be retried on
    fn tomorrow(&self) -> NaiveDate {
        (self.now() + Duration::days(1)).date_naive()
    }

    fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
