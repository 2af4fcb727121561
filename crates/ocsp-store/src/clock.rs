//! Injected time source
//!
//! The import engine stamps every row it touches and sweeps rows older than
//! the import start. Both sides of that comparison must come from the same
//! clock, and tests need to control it, so the engine takes the clock as a
//! collaborator instead of calling `Utc::now()` inline.

use chrono::{DateTime, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock; what production uses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
