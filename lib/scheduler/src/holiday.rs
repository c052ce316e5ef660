//! Holiday calendar shared by holiday-skipping triggers.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

/// An additive set of dates on which holiday-skipping triggers never fire.
///
/// The calendar is owned by the caller and handed to each trigger that
/// should honor it. Clones share the same set, so registering a holiday
/// through any clone is visible to every trigger holding the calendar.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    dates: Arc<RwLock<BTreeSet<NaiveDate>>>,
}

impl HolidayCalendar {
    /// Creates an empty calendar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers additional holidays. Dates already present are ignored.
    pub fn add_holidays<I>(&self, dates: I)
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut set = self.dates.write().unwrap_or_else(PoisonError::into_inner);
        set.extend(dates);
    }

    /// Returns whether `date` is a registered holiday.
    #[must_use]
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&date)
    }

    /// Number of registered holidays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no holidays are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<NaiveDate> for HolidayCalendar {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        let calendar = Self::new();
        calendar.add_holidays(iter);
        calendar
    }
}
