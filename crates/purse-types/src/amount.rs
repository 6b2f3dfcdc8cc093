//! Fixed-point money.
//!
//! All balances and transaction values are carried as unsigned minor units
//! (cents). Floating point never enters the tree; arithmetic that could
//! overflow or underflow is checked and surfaces as a typed error at the
//! call site.

use serde::{Deserialize, Serialize};

/// Monetary value in minor units of the platform currency.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub u64);

impl Amount {
    pub fn zero() -> Self {
        Self(0)
    }

    /// Construct from minor units (cents).
    pub fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Construct from major units, e.g. `Amount::from_major(300)` is 300.00.
    pub fn from_major(major: u64) -> Self {
        Self(major * 100)
    }

    /// Raw minor units.
    pub fn minor(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::zero(), |acc, a| acc.saturating_add(a))
    }
}
