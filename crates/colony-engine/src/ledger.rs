//! Per-player resource balances with timestamp-driven accrual.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use colony_core::{ResourceBundle, ResourceKind};
use colony_econ::{scaled_accrual, split_scaled, EconError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Authoritative balances of one player.
///
/// Balances are whole and never negative. Fractional production is kept in
/// `carry` (scaled by [`colony_econ::MILLIS_PER_HOUR`]) until it adds up to a
/// whole unit, and `last_accrued_at` only moves forward, so re-running accrual
/// for an instant already covered is a no-op.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceLedger {
    balances: ResourceBundle,
    #[serde(default)]
    carry: BTreeMap<ResourceKind, Decimal>,
    last_accrued_at: DateTime<Utc>,
}

impl ResourceLedger {
    pub fn new(starting: ResourceBundle, now: DateTime<Utc>) -> Self {
        Self {
            balances: starting,
            carry: BTreeMap::new(),
            last_accrued_at: now,
        }
    }

    pub fn balances(&self) -> &ResourceBundle {
        &self.balances
    }

    pub fn balance(&self, kind: ResourceKind) -> u64 {
        self.balances.get(kind)
    }

    pub fn last_accrued_at(&self) -> DateTime<Utc> {
        self.last_accrued_at
    }

    /// Apply production from `last_accrued_at` up to `now` and advance the stamp.
    ///
    /// `caps`, when given, bounds the balance of each listed kind; a balance
    /// already above its cap is left as is. Returns the whole units credited.
    pub fn accrue(
        &mut self,
        rates: &BTreeMap<ResourceKind, Decimal>,
        caps: Option<&BTreeMap<ResourceKind, u64>>,
        now: DateTime<Utc>,
    ) -> Result<ResourceBundle, EconError> {
        let elapsed_ms = (now - self.last_accrued_at).num_milliseconds();
        if elapsed_ms <= 0 {
            return Ok(ResourceBundle::new());
        }

        let mut credited = ResourceBundle::new();
        let mut next_carry = self.carry.clone();
        let mut next_balances = self.balances.clone();
        for kind in ResourceKind::ALL {
            let rate = rates.get(&kind).copied().unwrap_or(Decimal::ZERO);
            let carry = next_carry.get(&kind).copied().unwrap_or(Decimal::ZERO);
            let (whole, frac) = split_scaled(carry + scaled_accrual(rate, elapsed_ms)?);
            let current = next_balances.get(kind);
            let cap = caps.and_then(|c| c.get(&kind)).copied();
            let gained = match cap {
                Some(cap) if current >= cap => 0,
                Some(cap) => whole.min(cap - current),
                None => whole,
            };
            let frac = if cap.is_some_and(|c| current + gained >= c) {
                Decimal::ZERO
            } else {
                frac
            };
            next_balances.add(kind, gained);
            credited.add(kind, gained);
            next_carry.insert(kind, frac);
        }

        self.balances = next_balances;
        self.carry = next_carry;
        self.last_accrued_at = now;
        debug!(elapsed_ms, credited = %credited, "accrued");
        Ok(credited)
    }

    /// Remove `cost` if every balance covers it; otherwise change nothing.
    pub fn deduct(&mut self, cost: &ResourceBundle) -> Result<(), EngineError> {
        let shortfall = self.balances.shortfall(cost);
        if !shortfall.is_empty() {
            return Err(EngineError::InsufficientResources { shortfall });
        }
        for (kind, amount) in cost.iter() {
            let have = self.balances.get(kind);
            self.balances.set(kind, have - amount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn starter() -> ResourceBundle {
        ResourceBundle::new()
            .with(ResourceKind::Metal, 500)
            .with(ResourceKind::Crystal, 300)
            .with(ResourceKind::Food, 200)
    }

    fn metal_rate(per_hour: i64) -> BTreeMap<ResourceKind, Decimal> {
        BTreeMap::from([(ResourceKind::Metal, Decimal::new(per_hour, 0))])
    }

    #[test]
    fn deduct_is_all_or_nothing() {
        let mut ledger = ResourceLedger::new(starter(), t0());
        let cost = ResourceBundle::new()
            .with(ResourceKind::Metal, 100)
            .with(ResourceKind::Food, 201);
        let err = ledger.deduct(&cost).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientResources {
                shortfall: ResourceBundle::new().with(ResourceKind::Food, 1)
            }
        );
        assert_eq!(ledger.balances(), &starter());

        let ok = ResourceBundle::new()
            .with(ResourceKind::Metal, 100)
            .with(ResourceKind::Crystal, 50);
        ledger.deduct(&ok).unwrap();
        assert_eq!(ledger.balance(ResourceKind::Metal), 400);
        assert_eq!(ledger.balance(ResourceKind::Crystal), 250);
        assert_eq!(ledger.balance(ResourceKind::Food), 200);
    }

    #[test]
    fn accrual_same_instant_is_noop() {
        let mut ledger = ResourceLedger::new(starter(), t0());
        let now = t0() + TimeDelta::try_hours(1).unwrap();
        ledger.accrue(&metal_rate(30), None, now).unwrap();
        assert_eq!(ledger.balance(ResourceKind::Metal), 530);
        let again = ledger.accrue(&metal_rate(30), None, now).unwrap();
        assert!(again.is_empty());
        assert_eq!(ledger.balance(ResourceKind::Metal), 530);
    }

    #[test]
    fn backwards_clock_does_not_rewind_stamp() {
        let mut ledger = ResourceLedger::new(starter(), t0());
        let earlier = t0() - TimeDelta::try_minutes(5).unwrap();
        ledger.accrue(&metal_rate(3600), None, earlier).unwrap();
        assert_eq!(ledger.last_accrued_at(), t0());
        assert_eq!(ledger.balance(ResourceKind::Metal), 500);
    }

    #[test]
    fn frequent_polls_keep_fractions() {
        // 30/h is one unit every 120s; sixty 2s polls add up to exactly one unit.
        let mut ledger = ResourceLedger::new(starter(), t0());
        for i in 1..=60 {
            let now = t0() + TimeDelta::try_seconds(2 * i).unwrap();
            ledger.accrue(&metal_rate(30), None, now).unwrap();
        }
        assert_eq!(ledger.balance(ResourceKind::Metal), 501);
    }

    #[test]
    fn caps_clamp_growth_but_never_reduce() {
        let mut ledger = ResourceLedger::new(starter(), t0());
        let caps = BTreeMap::from([(ResourceKind::Metal, 510)]);
        let now = t0() + TimeDelta::try_hours(1).unwrap();
        let credited = ledger.accrue(&metal_rate(30), Some(&caps), now).unwrap();
        assert_eq!(credited.get(ResourceKind::Metal), 10);
        assert_eq!(ledger.balance(ResourceKind::Metal), 510);

        let low = BTreeMap::from([(ResourceKind::Metal, 100)]);
        let later = now + TimeDelta::try_hours(1).unwrap();
        ledger.accrue(&metal_rate(30), Some(&low), later).unwrap();
        assert_eq!(ledger.balance(ResourceKind::Metal), 510);
    }

    proptest! {
        #[test]
        fn deduct_never_goes_negative(costs in proptest::collection::vec((0u64..400, 0u64..400, 0u64..400), 1..20)) {
            let mut ledger = ResourceLedger::new(starter(), t0());
            for (m, c, f) in costs {
                let before = ledger.balances().clone();
                let cost = ResourceBundle::new()
                    .with(ResourceKind::Metal, m)
                    .with(ResourceKind::Crystal, c)
                    .with(ResourceKind::Food, f);
                match ledger.deduct(&cost) {
                    Ok(()) => {
                        prop_assert_eq!(ledger.balance(ResourceKind::Metal), before.get(ResourceKind::Metal) - m);
                        prop_assert_eq!(ledger.balance(ResourceKind::Food), before.get(ResourceKind::Food) - f);
                    }
                    Err(_) => prop_assert_eq!(ledger.balances(), &before),
                }
            }
        }

        #[test]
        fn accrual_is_split_invariant(split in 1i64..3_599, rate in 1i64..10_000) {
            let rates = metal_rate(rate);
            let end = t0() + TimeDelta::try_seconds(3_600).unwrap();
            let mut once = ResourceLedger::new(starter(), t0());
            once.accrue(&rates, None, end).unwrap();
            let mut twice = ResourceLedger::new(starter(), t0());
            twice.accrue(&rates, None, t0() + TimeDelta::try_seconds(split).unwrap()).unwrap();
            twice.accrue(&rates, None, end).unwrap();
            prop_assert_eq!(once.balance(ResourceKind::Metal), twice.balance(ResourceKind::Metal));
        }
    }
}
