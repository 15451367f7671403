//! The limit manager half of C9: per-customer, per-transaction-type
//! single/daily/monthly counters, an idempotent usage ledger keyed by
//! transaction id, and reversal inversion (P6).
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use fep_core::error::TransactionError;
use fep_core::ids::{CustomerId, TransactionId};
use fep_core::model::{Money, TransactionType};
use fep_core::time::DateProvider;
use fep_pipeline::{Handler, PipelineContext, Stage};
use tracing::warn;

/// Single/daily/monthly ceilings for one transaction type. `None` means "no
/// ceiling at that horizon" — a channel might cap per-transaction amount
/// without capping the daily cumulative, for instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct LimitRule {
    pub single_max_minor_units: Option<i64>,
    pub daily_max_minor_units: Option<i64>,
    pub monthly_max_minor_units: Option<i64>,
}

/// Which horizon a [`LimitManager::check_limits`] rejection breached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitHorizon {
    Single,
    Daily,
    Monthly,
}

/// A failed limit check: which horizon was breached and how much headroom
/// remained before the attempted amount, so a caller can report "remaining
/// amount" the way §4.9 requires.
#[derive(Clone, Copy, Debug)]
pub struct LimitBreach {
    pub horizon: LimitHorizon,
    pub remaining_minor_units: i64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    day: Option<NaiveDate>,
    daily_total: i64,
    month: Option<(i32, u32)>,
    monthly_total: i64,
}

impl Counters {
    fn rolled_for(&self, today: NaiveDate) -> Self {
        use chrono::Datelike;
        let mut next = *self;
        if next.day != Some(today) {
            next.day = Some(today);
            next.daily_total = 0;
        }
        let ym = (today.year(), today.month());
        if next.month != Some(ym) {
            next.month = Some(ym);
            next.monthly_total = 0;
        }
        next
    }
}

/// One recorded approval, kept around only so a later reversal can invert it
/// exactly and so `record_usage` is idempotent per transaction id (§4.9).
#[derive(Clone, Debug)]
struct RecordedUsage {
    customer_id: CustomerId,
    transaction_type: TransactionType,
    amount_minor_units: i64,
    reversed: bool,
}

pub struct LimitManager {
    rules: DashMap<TransactionType, LimitRule>,
    counters: DashMap<(CustomerId, TransactionType), Counters>,
    usages: DashMap<TransactionId, RecordedUsage>,
    dates: Arc<dyn DateProvider>,
}

impl LimitManager {
    pub fn new(dates: Arc<dyn DateProvider>) -> Self {
        Self {
            rules: DashMap::new(),
            counters: DashMap::new(),
            usages: DashMap::new(),
            dates,
        }
    }

    pub fn set_rule(&self, transaction_type: TransactionType, rule: LimitRule) {
        self.rules.insert(transaction_type, rule);
    }

    /// §4.9: pass/fail, with the specific limit breached and the remaining
    /// amount. A customer-less request (no `customer_id`) cannot be limit
    /// checked and always passes — limits are attributed to customers, not
    /// bare terminals.
    pub fn check_limits(&self, customer_id: &CustomerId, transaction_type: &TransactionType, amount: &Money) -> Result<(), LimitBreach> {
        let Some(rule) = self.rules.get(transaction_type).map(|r| *r) else {
            return Ok(());
        };
        let amount = amount.minor_units;

        if let Some(max) = rule.single_max_minor_units {
            if amount > max {
                return Err(LimitBreach { horizon: LimitHorizon::Single, remaining_minor_units: (max).max(0) });
            }
        }

        let today = self.dates.today();
        let counters = self
            .counters
            .get(&(customer_id.clone(), transaction_type.clone()))
            .map(|c| c.rolled_for(today))
            .unwrap_or_default()
            .rolled_for(today);

        if let Some(max) = rule.daily_max_minor_units {
            let projected = counters.daily_total + amount;
            if projected > max {
                return Err(LimitBreach {
                    horizon: LimitHorizon::Daily,
                    remaining_minor_units: (max - counters.daily_total).max(0),
                });
            }
        }
        if let Some(max) = rule.monthly_max_minor_units {
            let projected = counters.monthly_total + amount;
            if projected > max {
                return Err(LimitBreach {
                    horizon: LimitHorizon::Monthly,
                    remaining_minor_units: (max - counters.monthly_total).max(0),
                });
            }
        }
        Ok(())
    }

    /// §4.9: "called only after an approved response", idempotent per
    /// transaction id — calling it twice for the same `transaction_id` is a
    /// no-op on the second call.
    pub fn record_usage(
        &self,
        transaction_id: TransactionId,
        customer_id: &CustomerId,
        transaction_type: &TransactionType,
        amount: &Money,
    ) {
        if self.usages.contains_key(&transaction_id) {
            return;
        }
        let today = self.dates.today();
        let key = (customer_id.clone(), transaction_type.clone());
        self.counters
            .entry(key)
            .and_modify(|c| {
                *c = c.rolled_for(today);
                c.daily_total += amount.minor_units;
                c.monthly_total += amount.minor_units;
            })
            .or_insert_with(|| {
                let mut c = Counters::default().rolled_for(today);
                c.daily_total = amount.minor_units;
                c.monthly_total = amount.minor_units;
                c
            });
        self.usages.insert(
            transaction_id,
            RecordedUsage {
                customer_id: customer_id.clone(),
                transaction_type: transaction_type.clone(),
                amount_minor_units: amount.minor_units,
                reversed: false,
            },
        );
    }

    /// P6: inverts the usage recorded for `original_transaction_id`, exactly
    /// restoring the counters to their value immediately before it was
    /// recorded, provided it was approved (i.e. present in the ledger) and
    /// not already reversed. Reversing an unknown or already-reversed
    /// transaction is a no-op, logged as a warning rather than failing the
    /// reversal's own pipeline run — the reversal transaction itself may
    /// still be approved at the processor's discretion.
    pub fn reverse_usage(&self, original_transaction_id: TransactionId) {
        let Some(mut usage) = self.usages.get_mut(&original_transaction_id) else {
            warn!(%original_transaction_id, "reversal referenced an unknown transaction id");
            return;
        };
        if usage.reversed {
            warn!(%original_transaction_id, "reversal referenced an already-reversed transaction");
            return;
        }
        let today = self.dates.today();
        let key = (usage.customer_id.clone(), usage.transaction_type.clone());
        if let Some(mut counters) = self.counters.get_mut(&key) {
            *counters = counters.rolled_for(today);
            counters.daily_total -= usage.amount_minor_units;
            counters.monthly_total -= usage.amount_minor_units;
        }
        usage.reversed = true;
    }
}

/// Installed into the VALIDATION stage (§4.7: "limit check via C9"). Stores
/// nothing in [`PipelineContext::attributes`] — a breach is reported directly
/// as a decline, and an approved response's usage is recorded by the AUDIT
/// stage's handler, not here, since usage must only be recorded for an
/// approved outcome which is not known until PROCESSING has run.
pub struct LimitCheckHandler {
    pub manager: Arc<LimitManager>,
}

#[async_trait]
impl Handler for LimitCheckHandler {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    fn order(&self) -> i32 {
        50
    }

    fn name(&self) -> &str {
        "limit_check"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        let Some(customer_id) = ctx.request.customer_id.clone() else {
            return Ok(());
        };
        match self.manager.check_limits(&customer_id, &ctx.request.transaction_type, &ctx.request.amount) {
            Ok(()) => Ok(()),
            Err(breach) => Err(TransactionError::limit_exceeded(format!(
                "{:?} limit exceeded, {} minor units remaining",
                breach.horizon, breach.remaining_minor_units
            ))),
        }
    }
}
