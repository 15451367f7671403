//! C9: the limit manager and field validators — the VALIDATION stage's
//! contents (`spec.md` §4.9). Card, amount, PIN-block, and terminal id
//! validators run first; the limit check runs last in the same stage so a
//! structurally invalid request never touches the limit ledger.
pub mod limit_manager;
pub mod validators;

pub use limit_manager::{LimitBreach, LimitCheckHandler, LimitHorizon, LimitManager, LimitRule};
pub use validators::{AmountRule, AmountValidator, CardValidator, PinBlockValidator, TerminalIdValidator};
