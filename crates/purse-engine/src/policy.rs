use purse_types::{PurseError, PurseResult, Tier};

/// Limit set for one tier. `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLimits {
    /// Member ceiling for groups created at this tier.
    pub max_group_members: Option<u32>,
    /// Purchases allowed per calendar month.
    pub monthly_purchases: Option<u32>,
    /// Live groups an account may have created at once.
    pub max_groups: Option<u32>,
}

impl TierLimits {
    pub fn unbounded() -> Self {
        Self {
            max_group_members: None,
            monthly_purchases: None,
            max_groups: None,
        }
    }
}

/// Tier limit table.
///
/// A pure value object: it reads no persisted state and the same inputs
/// always produce the same answer. Injected at engine bootstrap so tests can
/// run any table they like. Counter bookkeeping (monthly resets) belongs to
/// the engine, not here.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    pub free: TierLimits,
    pub standard: TierLimits,
    pub premium: TierLimits,
    pub gold: TierLimits,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            free: TierLimits {
                max_group_members: Some(5),
                monthly_purchases: Some(5),
                max_groups: Some(1),
            },
            standard: TierLimits {
                max_group_members: Some(7),
                monthly_purchases: Some(20),
                max_groups: Some(3),
            },
            premium: TierLimits {
                max_group_members: Some(15),
                monthly_purchases: Some(100),
                max_groups: Some(10),
            },
            gold: TierLimits::unbounded(),
        }
    }
}

impl TierPolicy {
    pub fn limits(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Standard => &self.standard,
            Tier::Premium => &self.premium,
            Tier::Gold => &self.gold,
        }
    }

    /// Clamp a requested group capacity to the tier ceiling. Unbounded tiers
    /// get the requested value verbatim.
    pub fn effective_capacity(&self, tier: Tier, requested: u32) -> u32 {
        match self.limits(tier).max_group_members {
            Some(ceiling) => requested.min(ceiling),
            None => requested,
        }
    }

    /// Whether another purchase is allowed given `used` purchases this month.
    pub fn check_purchase(&self, tier: Tier, used: u32) -> PurseResult<()> {
        if let Some(limit) = self.limits(tier).monthly_purchases {
            if used >= limit {
                return Err(PurseError::PurchaseLimitReached { limit });
            }
        }
        Ok(())
    }

    /// Whether the account may create another group given `created` live ones.
    pub fn check_group_creation(&self, tier: Tier, created: u32) -> PurseResult<()> {
        if let Some(limit) = self.limits(tier).max_groups {
            if created >= limit {
                return Err(PurseError::GroupQuotaReached { limit });
            }
        }
        Ok(())
    }
}
