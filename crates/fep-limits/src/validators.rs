//! The four field validators named in §4.9, each a [`fep_pipeline::Handler`]
//! registered to [`Stage::Validation`]: card, amount, PIN-block, terminal id.
//! `order()` fixes a deterministic check sequence (card shape before
//! expiration before amount before PIN), though none of them depend on a
//! prior validator's side effects — each inspects the request only.
use async_trait::async_trait;
use fep_core::error::TransactionError;
use fep_core::model::{TransactionRequest, TransactionType};
use fep_pipeline::{Handler, PipelineContext, Stage};

/// Card-number validator: length 13–19 digits, an optional Luhn checksum
/// (some channels carry pre-validated PANs from an upstream vendor and
/// disable it), and expiration in `YYMM` (ISO 8583 field 14 convention —
/// scenario 1's `"2912"` is December 2029, not month 29).
pub struct CardValidator {
    pub require_luhn: bool,
}

impl CardValidator {
    pub fn new(require_luhn: bool) -> Self {
        Self { require_luhn }
    }
}

impl Default for CardValidator {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Handler for CardValidator {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    fn order(&self) -> i32 {
        10
    }

    fn name(&self) -> &str {
        "card_validator"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        validate_card(&ctx.request, self.require_luhn)
    }
}

fn validate_card(request: &TransactionRequest, require_luhn: bool) -> Result<(), TransactionError> {
    let digits = request.pan.len();
    if !request.pan.bytes().all(|b| b.is_ascii_digit()) || !(13..=19).contains(&digits) {
        return Err(TransactionError::invalid_card("pan must be 13-19 digits"));
    }
    if require_luhn && !luhn_checksum_valid(&request.pan) {
        return Err(TransactionError::invalid_card("pan fails luhn checksum"));
    }
    if let Some(expiry) = &request.expiry {
        if expiry_has_passed(expiry)? {
            return Err(TransactionError::expired_card());
        }
    }
    Ok(())
}

/// `true` iff `pan` satisfies the Luhn checksum (sum of digits, doubling
/// every second digit from the rightmost, is a multiple of 10).
fn luhn_checksum_valid(pan: &str) -> bool {
    let mut sum = 0u32;
    for (i, ch) in pan.bytes().rev().enumerate() {
        let mut digit = (ch - b'0') as u32;
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Parses a `YYMM` expiry and reports whether it has already passed,
/// relative to the wall-clock date the validator runs on. A two-digit year
/// is windowed onto the current century (`20YY`), matching how the source
/// system's field-14 convention is used in practice for a 21st-century
/// deployment.
fn expiry_has_passed(expiry: &str) -> Result<bool, TransactionError> {
    if expiry.len() != 4 || !expiry.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TransactionError::invalid_card("expiry must be YYMM"));
    }
    let yy: i32 = expiry[0..2].parse().map_err(|_| TransactionError::invalid_card("expiry must be YYMM"))?;
    let mm: u32 = expiry[2..4].parse().map_err(|_| TransactionError::invalid_card("expiry must be YYMM"))?;
    if !(1..=12).contains(&mm) {
        return Err(TransactionError::invalid_card("expiry month out of range"));
    }
    let year = 2000 + yy;
    let today = chrono::Local::now().date_naive();
    let expiry_last_day = last_day_of_month(year, mm);
    Ok(expiry_last_day < today)
}

fn last_day_of_month(year: i32, month: u32) -> chrono::NaiveDate {
    use chrono::NaiveDate;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
}

/// Per-transaction-type amount rules: a positive floor, an optional ceiling,
/// and an optional "must be a multiple of" rule some channels impose (e.g.
/// cash dispensers that only hold a fixed note denomination).
#[derive(Clone, Debug)]
pub struct AmountRule {
    pub min_minor_units: i64,
    pub max_minor_units: Option<i64>,
    pub multiple_of_minor_units: Option<i64>,
}

impl Default for AmountRule {
    fn default() -> Self {
        Self {
            min_minor_units: 1,
            max_minor_units: None,
            multiple_of_minor_units: None,
        }
    }
}

pub struct AmountValidator {
    rules: dashmap::DashMap<TransactionType, AmountRule>,
    default_rule: AmountRule,
}

impl AmountValidator {
    pub fn new(default_rule: AmountRule) -> Self {
        Self {
            rules: dashmap::DashMap::new(),
            default_rule,
        }
    }

    pub fn set_rule(&self, transaction_type: TransactionType, rule: AmountRule) {
        self.rules.insert(transaction_type, rule);
    }

    fn rule_for(&self, transaction_type: &TransactionType) -> AmountRule {
        self.rules
            .get(transaction_type)
            .map(|r| r.clone())
            .unwrap_or_else(|| self.default_rule.clone())
    }
}

#[async_trait]
impl Handler for AmountValidator {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    fn order(&self) -> i32 {
        20
    }

    fn name(&self) -> &str {
        "amount_validator"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        let rule = self.rule_for(&ctx.request.transaction_type);
        let amount = ctx.request.amount.minor_units;
        if amount < rule.min_minor_units {
            return Err(TransactionError::invalid_amount(format!(
                "amount {amount} below minimum {}",
                rule.min_minor_units
            )));
        }
        if let Some(max) = rule.max_minor_units {
            if amount > max {
                return Err(TransactionError::invalid_amount(format!("amount {amount} exceeds maximum {max}")));
            }
        }
        if let Some(multiple) = rule.multiple_of_minor_units {
            if multiple > 0 && amount % multiple != 0 {
                return Err(TransactionError::invalid_amount(format!(
                    "amount {amount} is not a multiple of {multiple}"
                )));
            }
        }
        Ok(())
    }
}

/// PIN-block requirement, per transaction type — a withdrawal or transfer
/// needs one; a balance inquiry typically does not.
pub struct PinBlockValidator {
    required_for: std::collections::HashSet<TransactionType>,
}

impl PinBlockValidator {
    pub fn new(required_for: impl IntoIterator<Item = TransactionType>) -> Self {
        Self {
            required_for: required_for.into_iter().collect(),
        }
    }

    /// The conventional default: withdrawal, transfer, and bill payment
    /// require a PIN block; inquiries and reversals do not.
    pub fn with_defaults() -> Self {
        Self::new([TransactionType::Withdrawal, TransactionType::Transfer, TransactionType::BillPayment])
    }
}

#[async_trait]
impl Handler for PinBlockValidator {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    fn order(&self) -> i32 {
        30
    }

    fn name(&self) -> &str {
        "pin_block_validator"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        if self.required_for.contains(&ctx.request.transaction_type) && ctx.request.pin_block.is_none() {
            return Err(TransactionError::pin_required());
        }
        Ok(())
    }
}

/// Terminal-id validator: non-empty, and (when configured) matching the
/// expected vendor prefix/length convention for the originating channel.
/// Kept deliberately simple — the registry's channel/profile records are the
/// authority on vendor shape, not this validator.
#[derive(Default)]
pub struct TerminalIdValidator;

#[async_trait]
impl Handler for TerminalIdValidator {
    fn stage(&self) -> Stage {
        Stage::Validation
    }

    fn order(&self) -> i32 {
        40
    }

    fn name(&self) -> &str {
        "terminal_id_validator"
    }

    async fn handle(&self, ctx: &mut PipelineContext) -> Result<(), TransactionError> {
        if ctx.request.terminal_id.is_empty() {
            return Err(TransactionError::new(
                fep_core::error::codes::UNKNOWN_ACCOUNT,
                "terminal id must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fep_core::ids::{TerminalId, TransactionId};
    use fep_core::model::Money;

    fn sample_request() -> TransactionRequest {
        TransactionRequest {
            transaction_id: TransactionId::new(),
            transaction_type: TransactionType::Withdrawal,
            processing_code: "010000".into(),
            pan: "4111111111111111".into(),
            expiry: Some(future_expiry()),
            amount: Money::new(1_000, "TWD"),
            source_account: None,
            destination_account: None,
            terminal_id: TerminalId::new("ATM00001"),
            rrn: "123456789012".into(),
            stan: "000001".into(),
            pin_block: Some("ABCDEF1234567890".into()),
            acquiring_bank_code: None,
            channel_name: "ATM_NCR_V1".into(),
            customer_id: None,
            original_transaction_id: None,
            extensions: Default::default(),
        }
    }

    fn future_expiry() -> String {
        let today = chrono::Local::now().date_naive();
        use chrono::Datelike;
        format!("{:02}{:02}", (today.year() + 5) % 100, today.month())
    }

    #[test]
    fn luhn_accepts_the_well_known_test_pan() {
        assert!(luhn_checksum_valid("4111111111111111"));
        assert!(!luhn_checksum_valid("4111111111111112"));
    }

    #[tokio::test]
    async fn card_validator_rejects_short_pan() {
        let mut request = sample_request();
        request.pan = "411111".into();
        let mut ctx = PipelineContext::new(request, Default::default());
        let err = CardValidator::default().handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::INVALID_CARD);
    }

    #[tokio::test]
    async fn card_validator_rejects_expired_card() {
        let mut request = sample_request();
        request.expiry = Some("2001".into());
        let mut ctx = PipelineContext::new(request, Default::default());
        let err = CardValidator::default().handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::EXPIRED_CARD);
    }

    #[tokio::test]
    async fn card_validator_accepts_valid_request() {
        let mut ctx = PipelineContext::new(sample_request(), Default::default());
        CardValidator::default().handle(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn amount_validator_rejects_non_positive_amount() {
        let mut request = sample_request();
        request.amount = Money::new(0, "TWD");
        let mut ctx = PipelineContext::new(request, Default::default());
        let validator = AmountValidator::new(AmountRule::default());
        let err = validator.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::INVALID_AMOUNT);
    }

    #[tokio::test]
    async fn amount_validator_enforces_per_type_maximum() {
        let mut request = sample_request();
        request.amount = Money::new(999_999_999, "TWD");
        let mut ctx = PipelineContext::new(request, Default::default());
        let validator = AmountValidator::new(AmountRule::default());
        validator.set_rule(
            TransactionType::Withdrawal,
            AmountRule { min_minor_units: 1, max_minor_units: Some(500_000), multiple_of_minor_units: None },
        );
        let err = validator.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::INVALID_AMOUNT);
    }

    #[tokio::test]
    async fn pin_block_validator_rejects_missing_pin_for_withdrawal() {
        let mut request = sample_request();
        request.pin_block = None;
        let mut ctx = PipelineContext::new(request, Default::default());
        let err = PinBlockValidator::with_defaults().handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.response_code, fep_core::error::codes::PIN_REQUIRED);
    }

    #[tokio::test]
    async fn pin_block_validator_allows_missing_pin_for_balance_inquiry() {
        let mut request = sample_request();
        request.transaction_type = TransactionType::BalanceInquiry;
        request.pin_block = None;
        let mut ctx = PipelineContext::new(request, Default::default());
        PinBlockValidator::with_defaults().handle(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_id_validator_rejects_empty_terminal() {
        let mut request = sample_request();
        request.terminal_id = TerminalId::new("");
        let mut ctx = PipelineContext::new(request, Default::default());
        TerminalIdValidator.handle(&mut ctx).await.unwrap_err();
    }
}
