//! # Validity Predicate
//!
//! One pure answer to "is this definition in force at instant T?".
//!
//! Every time-scoped definition (override, rule, promotion) implements
//! [`Validity`]; the engine only ever calls [`is_active`] with the as-of
//! instant it was handed, so resolving the same request twice gives the
//! same answer no matter when it runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive validity window. `None` on either side means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    /// A window with no bounds.
    pub const fn always() -> Self {
        ValidityWindow {
            valid_from: None,
            valid_to: None,
        }
    }

    pub const fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        ValidityWindow {
            valid_from: Some(from),
            valid_to: Some(to),
        }
    }

    /// True when `at` lies inside the window (both ends inclusive).
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| at >= from) && self.valid_to.map_or(true, |to| at <= to)
    }

    /// True when the window has not opened yet at `at`.
    pub fn starts_after(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.is_some_and(|from| at < from)
    }

    /// True when the window already closed at `at`.
    pub fn ended_before(&self, at: DateTime<Utc>) -> bool {
        self.valid_to.is_some_and(|to| at > to)
    }

    /// A window is well formed when `from <= to`.
    pub fn is_well_formed(&self) -> bool {
        match (self.valid_from, self.valid_to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }
}

/// A time-scoped, switchable definition.
pub trait Validity {
    /// Administrative on/off switch.
    fn enabled(&self) -> bool;

    fn window(&self) -> &ValidityWindow;
}

/// The single validity predicate used throughout resolution.
#[inline]
pub fn is_active<T: Validity + ?Sized>(entity: &T, as_of: DateTime<Utc>) -> bool {
    entity.enabled() && entity.window().contains(as_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Flagged {
        on: bool,
        window: ValidityWindow,
    }

    impl Validity for Flagged {
        fn enabled(&self) -> bool {
            self.on
        }

        fn window(&self) -> &ValidityWindow {
            &self.window
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = ValidityWindow::between(day(1), day(10));
        assert!(window.contains(day(1)));
        assert!(window.contains(day(10)));
        assert!(!window.contains(day(11)));
        assert!(window.starts_after(Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap()));
        assert!(window.ended_before(day(11)));
    }

    #[test]
    fn test_open_window() {
        assert!(ValidityWindow::always().contains(day(20)));
        assert!(ValidityWindow::always().is_well_formed());
        assert!(!ValidityWindow::between(day(5), day(1)).is_well_formed());
    }

    #[test]
    fn test_disabled_entity_is_never_active() {
        let entity = Flagged {
            on: false,
            window: ValidityWindow::always(),
        };
        assert!(!is_active(&entity, day(3)));

        let entity = Flagged {
            on: true,
            window: ValidityWindow::always(),
        };
        assert!(is_active(&entity, day(3)));
    }
}
