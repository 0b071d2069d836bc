//! Deposit status resolution.
//!
//! [`resolve`] is a pure function of the accumulated facts and the current time.
//! All percentage arithmetic is done on 1e18 fixed-point integers.

use crate::{
    book::Retention,
    types::{Deposit, DepositStatus, FeePct, IndexerObservation, Limits, FIXED_POINT_SCALE},
};
use alloy_primitives::U256;
use serde::Serialize;
use std::time::Duration;

/// Parameters of the derived flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Pending time after which a deposit above the short-delay limit is delayed
    pub delay_threshold: Duration,
    /// Tolerance on the quoted fee, 1e18 fixed point, greater than 1e18
    pub deviation_buffer_multiplier: U256,
    /// Bounds on facts held for deposits that were never seen
    pub retention: Retention,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            delay_threshold: Duration::from_secs(240),
            // 1.2
            deviation_buffer_multiplier: FIXED_POINT_SCALE * U256::from(12) / U256::from(10),
            retention: Retention::default(),
        }
    }
}

/// Authoritative classification of a deposit at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub status: DepositStatus,
    pub is_profitable: bool,
    pub is_delayed: bool,
    pub is_expired: bool,
    /// Seconds from deposit to fill, once filled and both timestamps are known
    pub fill_time_secs: Option<u64>,
}

/// Resolve a deposit against its latest indexer snapshot and route limits.
///
/// Missing limits, fees or timestamps never raise; the flags they feed evaluate to
/// `false`.
pub fn resolve(
    deposit: &Deposit,
    observation: Option<&IndexerObservation>,
    limits: Option<&Limits>,
    config: &ResolverConfig,
    now: u64,
) -> Resolution {
    let status = resolve_status(deposit, observation);
    let pending = status == DepositStatus::Pending;

    Resolution {
        status,
        is_profitable: pending
            && is_profitable(
                deposit.quoted_relayer_fee_pct,
                deposit.suggested_relayer_fee_pct,
                config.deviation_buffer_multiplier,
            ),
        is_delayed: pending && is_delayed(deposit, observation, limits, config.delay_threshold, now),
        is_expired: pending && is_expired(deposit.fill_deadline, now),
        fill_time_secs: fill_time(status, deposit, observation),
    }
}

/// A terminal status from either source wins; otherwise the deposit is pending.
fn resolve_status(deposit: &Deposit, observation: Option<&IndexerObservation>) -> DepositStatus {
    if deposit.status.is_terminal() {
        return deposit.status;
    }
    observation
        .map(IndexerObservation::status)
        .filter(|status| status.is_terminal())
        .unwrap_or(DepositStatus::Pending)
}

/// `suggested <= quoted * multiplier`, compared as `suggested * 1e18 <= quoted * multiplier`.
pub fn is_profitable(
    quoted: Option<FeePct>,
    suggested: Option<FeePct>,
    multiplier: U256,
) -> bool {
    let (Some(quoted), Some(suggested)) = (quoted, suggested) else {
        return false;
    };

    match (
        suggested.raw().checked_mul(FIXED_POINT_SCALE),
        quoted.raw().checked_mul(multiplier),
    ) {
        (Some(lhs), Some(rhs)) => lhs <= rhs,
        _ => false,
    }
}

/// A zero deadline means none was recorded.
pub const fn is_expired(fill_deadline: u64, now: u64) -> bool {
    fill_deadline != 0 && fill_deadline < now
}

fn is_delayed(
    deposit: &Deposit,
    observation: Option<&IndexerObservation>,
    limits: Option<&Limits>,
    threshold: Duration,
    now: u64,
) -> bool {
    let Some(limits) = limits else {
        return false;
    };
    let Some(created_at) = created_at(deposit, observation) else {
        return false;
    };

    now.saturating_sub(created_at) > threshold.as_secs()
        && deposit.input_amount > limits.max_deposit_short_delay
}

fn created_at(deposit: &Deposit, observation: Option<&IndexerObservation>) -> Option<u64> {
    if deposit.deposit_timestamp != 0 {
        return Some(deposit.deposit_timestamp);
    }
    observation.and_then(|o| o.deposit_block_timestamp)
}

fn fill_time(
    status: DepositStatus,
    deposit: &Deposit,
    observation: Option<&IndexerObservation>,
) -> Option<u64> {
    if status != DepositStatus::Filled {
        return None;
    }
    let filled_at = deposit
        .fill_timestamp
        .or_else(|| observation.and_then(|o| o.fill_block_timestamp))?;
    Some(filled_at.saturating_sub(created_at(deposit, observation)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_deposit, observation};

    const NOW: u64 = 1_700_000_000;

    fn config(threshold_secs: u64) -> ResolverConfig {
        ResolverConfig {
            delay_threshold: Duration::from_secs(threshold_secs),
            ..Default::default()
        }
    }

    #[test]
    fn test_profitable_within_tolerance() {
        let multiplier = ResolverConfig::default().deviation_buffer_multiplier;
        let quoted = Some(FeePct::new(U256::from(100)));

        assert!(is_profitable(quoted, Some(FeePct::new(U256::from(115))), multiplier));
        assert!(is_profitable(quoted, Some(FeePct::new(U256::from(120))), multiplier));
        assert!(!is_profitable(quoted, Some(FeePct::new(U256::from(125))), multiplier));
    }

    #[test]
    fn test_profitable_requires_both_fees() {
        let multiplier = ResolverConfig::default().deviation_buffer_multiplier;
        assert!(!is_profitable(None, Some(FeePct::ZERO), multiplier));
        assert!(!is_profitable(Some(FeePct::ZERO), None, multiplier));
    }

    #[test]
    fn test_delay_depends_on_amount_and_limits() {
        let mut deposit = mock_deposit(1);
        deposit.deposit_timestamp = NOW - 600;
        deposit.input_amount = U256::from(1000);
        let limits = Limits {
            max_deposit_short_delay: U256::from(500),
            ..Default::default()
        };

        let resolution = resolve(&deposit, None, Some(&limits), &config(240), NOW);
        assert!(resolution.is_delayed);

        deposit.input_amount = U256::from(100);
        let resolution = resolve(&deposit, None, Some(&limits), &config(240), NOW);
        assert!(!resolution.is_delayed);
    }

    #[test]
    fn test_delay_false_without_limits_or_before_threshold() {
        let mut deposit = mock_deposit(1);
        deposit.deposit_timestamp = NOW - 600;
        deposit.input_amount = U256::from(1000);
        assert!(!resolve(&deposit, None, None, &config(240), NOW).is_delayed);

        let limits = Limits::default();
        deposit.deposit_timestamp = NOW - 60;
        assert!(!resolve(&deposit, None, Some(&limits), &config(240), NOW).is_delayed);
    }

    #[test]
    fn test_expiry() {
        let mut deposit = mock_deposit(1);

        deposit.fill_deadline = NOW - 1;
        assert!(resolve(&deposit, None, None, &config(240), NOW).is_expired);

        deposit.fill_deadline = NOW + 3600;
        assert!(!resolve(&deposit, None, None, &config(240), NOW).is_expired);
    }

    #[test]
    fn test_terminal_status_clears_flags() {
        let mut deposit = mock_deposit(1);
        deposit.fill_deadline = NOW - 1;
        deposit.quoted_relayer_fee_pct = Some(FeePct::new(U256::from(100)));
        deposit.suggested_relayer_fee_pct = Some(FeePct::new(U256::from(100)));

        let resolution = resolve(
            &deposit,
            Some(&observation(DepositStatus::Filled)),
            None,
            &config(240),
            NOW,
        );
        assert_eq!(resolution.status, DepositStatus::Filled);
        assert!(!resolution.is_expired);
        assert!(!resolution.is_profitable);
        assert!(!resolution.is_delayed);
    }

    #[test]
    fn test_pending_indexer_status_does_not_override_terminal_deposit() {
        let mut deposit = mock_deposit(1);
        deposit.status = DepositStatus::Filled;

        let resolution = resolve(
            &deposit,
            Some(&observation(DepositStatus::Pending)),
            None,
            &config(240),
            NOW,
        );
        assert_eq!(resolution.status, DepositStatus::Filled);
    }

    #[test]
    fn test_fill_time() {
        let mut deposit = mock_deposit(1);
        deposit.deposit_timestamp = NOW - 90;
        deposit.status = DepositStatus::Filled;
        deposit.fill_timestamp = Some(NOW - 30);

        let resolution = resolve(&deposit, None, None, &config(240), NOW);
        assert_eq!(resolution.fill_time_secs, Some(60));

        deposit.status = DepositStatus::Pending;
        let resolution = resolve(&deposit, None, None, &config(240), NOW);
        assert_eq!(resolution.fill_time_secs, None);
    }
}
