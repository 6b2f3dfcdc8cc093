//! Deterministic payment gateways for tests and local development.

use async_trait::async_trait;
use chrono::Utc;
use purse_engine::{GatewayCharge, GatewayReceipt, PaymentGateway};
use purse_types::{PurseError, PurseResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// A gateway that confirms every charge and counts how many it saw.
pub struct MockGateway {
    provider_name: &'static str,
    collected: AtomicUsize,
}

impl MockGateway {
    pub fn new(provider_name: &'static str) -> Self {
        Self {
            provider_name,
            collected: AtomicUsize::new(0),
        }
    }

    /// How many charges this gateway has confirmed.
    pub fn collected(&self) -> usize {
        self.collected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn provider(&self) -> &'static str {
        self.provider_name
    }

    async fn collect(&self, charge: &GatewayCharge) -> PurseResult<GatewayReceipt> {
        let sequence = self.collected.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            provider = self.provider_name,
            token = %charge.token,
            amount = %charge.amount,
            "mock gateway confirmed charge"
        );
        Ok(GatewayReceipt {
            provider_reference: format!("{}-{:06}", self.provider_name, sequence),
            confirmed_at: Utc::now(),
        })
    }
}

/// A gateway that declines every charge with a fixed reason.
pub struct AlwaysFailGateway {
    provider_name: &'static str,
    reason: String,
}

impl AlwaysFailGateway {
    pub fn new(provider_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            provider_name,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for AlwaysFailGateway {
    fn provider(&self) -> &'static str {
        self.provider_name
    }

    async fn collect(&self, charge: &GatewayCharge) -> PurseResult<GatewayReceipt> {
        info!(
            provider = self.provider_name,
            token = %charge.token,
            "failing gateway declined charge"
        );
        Err(PurseError::GatewayFailure {
            provider: self.provider_name.to_string(),
            message: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purse_types::{AccountId, Amount, EntryToken};

    fn charge() -> GatewayCharge {
        GatewayCharge {
            token: EntryToken::generate(),
            account: AccountId::new("acct-1"),
            amount: Amount::from_minor(5_000),
            requested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_gateway_confirms_and_counts() {
        let gateway = MockGateway::new("mockpay");
        assert_eq!(gateway.provider(), "mockpay");

        let receipt = gateway.collect(&charge()).await.unwrap();
        assert!(receipt.provider_reference.starts_with("mockpay-"));
        gateway.collect(&charge()).await.unwrap();
        assert_eq!(gateway.collected(), 2);
    }

    #[tokio::test]
    async fn failing_gateway_reports_its_reason() {
        let gateway = AlwaysFailGateway::new("brokenpay", "maintenance window");

        let err = gateway.collect(&charge()).await.unwrap_err();
        match err {
            PurseError::GatewayFailure { provider, message } => {
                assert_eq!(provider, "brokenpay");
                assert_eq!(message, "maintenance window");
            }
            other => panic!("expected a gateway failure, got {:?}", other),
        }
    }
}
