use super::lifecycle::{SessionManager, Settlement};
use crate::domain::ids::SessionId;
use crate::domain::session::{Outcome, Session};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use subtle::ConstantTimeEq;
use tracing::warn;

/// The settlement capability offered to external game-rule engines.
///
/// Every game backend, whatever its rules, reports outcomes through this one
/// interface. Callers authenticate with a shared service credential that is
/// distinct from end-user sessions.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Read-only snapshot of a session, including its status so the caller
    /// can tell whether it was already settled.
    async fn get_session(&self, credential: &str, session_id: SessionId) -> Result<Session>;

    /// Reports the final result of a session. This is the only entry point
    /// through which game outcomes move money.
    async fn complete_session(
        &self,
        credential: &str,
        session_id: SessionId,
        result: Outcome,
        payout_cents: i64,
    ) -> Result<Settlement>;
}

pub type SettlementGatewayBox = Box<dyn SettlementGateway>;

/// Gateway for trusted in-cluster game services, authenticated by a shared
/// secret.
#[derive(Clone)]
pub struct TrustedGateway {
    manager: SessionManager,
    secret: Vec<u8>,
}

impl TrustedGateway {
    pub fn new(manager: SessionManager, secret: impl Into<String>) -> Self {
        Self {
            manager,
            secret: secret.into().into_bytes(),
        }
    }

    /// Uses the shared secret from the manager's configuration.
    pub fn from_config(manager: SessionManager) -> Self {
        let secret = manager.config().internal_api_key.clone();
        Self::new(manager, secret)
    }

    fn authenticate(&self, credential: &str) -> Result<()> {
        let presented = credential.as_bytes();
        // ct_eq short-circuits on length only, never on content.
        if !self.secret.is_empty() && bool::from(presented.ct_eq(&self.secret)) {
            Ok(())
        } else {
            warn!("settlement gateway rejected a credential");
            Err(LedgerError::Unauthorized)
        }
    }
}

#[async_trait]
impl SettlementGateway for TrustedGateway {
    async fn get_session(&self, credential: &str, session_id: SessionId) -> Result<Session> {
        self.authenticate(credential)?;
        self.manager.session(session_id).await
    }

    async fn complete_session(
        &self,
        credential: &str,
        session_id: SessionId,
        result: Outcome,
        payout_cents: i64,
    ) -> Result<Settlement> {
        self.authenticate(credential)?;
        self.manager
            .settle_session(session_id, result, payout_cents)
            .await
    }
}
