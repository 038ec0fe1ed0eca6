use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Date range one sweep may delete.
///
/// `horizon = today - retention_days` and `floor = horizon - scan_window_days`.
/// A record is in the window when `floor < date < horizon`. Records on or
/// before the floor are left for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionWindow {
    pub today: NaiveDate,
    pub horizon: NaiveDate,
    pub floor: NaiveDate,
}

impl RetentionWindow {
    pub fn compute(today: NaiveDate, retention_days: u32, scan_window_days: u32) -> Self {
        let horizon = today
            .checked_sub_days(Days::new(retention_days.into()))
            .unwrap_or(NaiveDate::MIN);
        let floor = horizon
            .checked_sub_days(Days::new(scan_window_days.into()))
            .unwrap_or(NaiveDate::MIN);
        Self {
            today,
            horizon,
            floor,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date > self.floor && date < self.horizon
    }
}
