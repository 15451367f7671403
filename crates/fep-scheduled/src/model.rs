//! The scheduled-transfer data model (§4.10): future-dated and recurring
//! transfers, held until their due date and then re-injected into the
//! pipeline as ordinary requests.
use chrono::NaiveDate;
use fep_core::ids::{CustomerId, ScheduleId};
use fep_core::model::Money;

/// How often a scheduled transfer recurs, per §4.10.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recurrence {
    OneTime,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// The next occurrence after `from`, per §4.10's "advance scheduledDate
    /// to the next occurrence (add 1 day/7 days/1 month)". `OneTime` has no
    /// next occurrence — callers must check `is_recurring` first.
    pub fn advance(self, from: NaiveDate) -> NaiveDate {
        match self {
            Recurrence::OneTime => from,
            Recurrence::Daily => from + chrono::Duration::days(1),
            Recurrence::Weekly => from + chrono::Duration::days(7),
            Recurrence::Monthly => add_one_month(from),
        }
    }

    pub fn is_recurring(self) -> bool {
        !matches!(self, Recurrence::OneTime)
    }
}

/// Adds one calendar month, clamping the day-of-month down when the target
/// month is shorter (e.g. Jan 31 + 1 month -> Feb 28/29).
fn add_one_month(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    let (year, month) = if date.month() == 12 { (date.year() + 1, 1) } else { (date.year(), date.month() + 1) };
    let mut day = date.day();
    loop {
        if let Some(next) = NaiveDate::from_ymd_opt(year, month, day) {
            return next;
        }
        day -= 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleStatus {
    Active,
    Suspended,
    Completed,
    Cancelled,
}

/// One future-dated or recurring transfer record, per §3/§4.10.
#[derive(Clone, Debug)]
pub struct ScheduledTransfer {
    pub schedule_id: ScheduleId,
    pub created_by: CustomerId,
    pub source_account: String,
    pub destination_account: String,
    pub amount: Money,
    pub recurrence: Recurrence,
    pub scheduled_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: ScheduleStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_advance_clamps_short_months() {
        let jan_31 = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(Recurrence::Monthly.advance(jan_31), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn weekly_advance_adds_seven_days() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(Recurrence::Weekly.advance(date), NaiveDate::from_ymd_opt(2026, 3, 8).unwrap());
    }

    #[test]
    fn one_time_is_not_recurring() {
        assert!(!Recurrence::OneTime.is_recurring());
        assert!(Recurrence::Monthly.is_recurring());
    }
}
