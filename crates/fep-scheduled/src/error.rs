use std::fmt;

/// Validation/authorization failures from [`crate::engine::ScheduledTransferEngine`],
/// distinct from [`fep_core::error::TransactionError`] because these are
/// admin-boundary rejections (§4.10's `createScheduledTransfer` checks, and
/// `cancel`'s ownership check) rather than in-flight pipeline declines.
#[derive(Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// Scheduled date is before today or more than one year out.
    DateOutOfRange,
    /// Amount is outside the configured transfer limit.
    AmountOutOfRange,
    NotFound,
    /// `cancel` was called with a customer id other than the one that
    /// created the entry.
    NotOwner,
    /// The entry is not in a state the requested operation permits (e.g.
    /// suspending an already-completed entry).
    InvalidState,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ScheduleError::DateOutOfRange => "scheduled date must be today or later, and within one year",
            ScheduleError::AmountOutOfRange => "amount is outside the configured transfer limit",
            ScheduleError::NotFound => "scheduled transfer not found",
            ScheduleError::NotOwner => "only the creating customer may cancel this scheduled transfer",
            ScheduleError::InvalidState => "scheduled transfer is not in a state that permits this operation",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ScheduleError {}
