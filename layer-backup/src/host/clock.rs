//! Wall-clock time source.

use super::Clock;
use chrono::NaiveDateTime;

/// Local time of the machine, which is what snapshot names are written in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl LocalClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
