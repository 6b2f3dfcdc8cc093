//! Payment gateway seam for externally funded deposits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use purse_types::{AccountId, Amount, EntryToken, PurseError, PurseResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Charge request handed to a gateway. Carries the pending entry token so
/// the provider's confirmation can be tied back to exactly one entry.
#[derive(Debug, Clone)]
pub struct GatewayCharge {
    pub token: EntryToken,
    pub account: AccountId,
    pub amount: Amount,
    pub requested_at: DateTime<Utc>,
}

/// Provider confirmation of a charge.
#[derive(Debug, Clone)]
pub struct GatewayReceipt {
    pub provider_reference: String,
    pub confirmed_at: DateTime<Utc>,
}

/// How a pending gateway deposit settles.
#[derive(Debug, Clone)]
pub enum GatewayOutcome {
    Confirmed,
    Failed { reason: String },
}

/// Pluggable external payment provider.
///
/// `collect` is called with no engine locks held; the balance moves only
/// after the outcome settles the pending entry.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn collect(&self, charge: &GatewayCharge) -> PurseResult<GatewayReceipt>;
}

/// Registry of payment gateways keyed by provider name.
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways
            .insert(gateway.provider().to_string(), gateway);
    }

    pub fn get(&self, provider: &str) -> PurseResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(provider)
            .cloned()
            .ok_or_else(|| PurseError::GatewayNotRegistered(provider.to_string()))
    }

    pub fn has(&self, provider: &str) -> bool {
        self.gateways.contains_key(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyGateway;

    #[async_trait]
    impl PaymentGateway for DummyGateway {
        fn provider(&self) -> &'static str {
            "dummy"
        }

        async fn collect(&self, charge: &GatewayCharge) -> PurseResult<GatewayReceipt> {
            Ok(GatewayReceipt {
                provider_reference: format!("dummy-{}", charge.token),
                confirmed_at: Utc::now(),
            })
        }
    }

    #[test]
    fn registry_roundtrip() {
        let mut registry = GatewayRegistry::new();
        registry.register(Arc::new(DummyGateway));
        assert!(registry.has("dummy"));
        assert!(registry.get("dummy").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(PurseError::GatewayNotRegistered(_))
        ));
    }
}
