use crate::application::gateway::{SettlementGatewayBox, TrustedGateway};
use crate::application::lifecycle::SessionManager;
use crate::domain::ids::AccountId;
use crate::domain::ledger::EntryType;
use crate::error::{DriverError, LedgerError};
use crate::interfaces::csv::command_reader::{Command, Op};
use crate::interfaces::csv::summary_writer::PlayerSummary;
use std::collections::BTreeMap;
use tracing::debug;

/// Drives the ledger from scripted player commands.
///
/// Players play through the [`SessionManager`]; outcomes are reported the way
/// an external game-rule engine would, through the settlement gateway with
/// the service credential.
pub struct Simulator {
    manager: SessionManager,
    gateway: SettlementGatewayBox,
    credential: String,
    players: BTreeMap<u32, AccountId>,
}

impl Simulator {
    pub fn new(manager: SessionManager) -> Self {
        let credential = manager.config().internal_api_key.clone();
        let gateway = Box::new(TrustedGateway::from_config(manager.clone()));
        Self::with_gateway(manager, gateway, credential)
    }

    pub fn with_gateway(
        manager: SessionManager,
        gateway: SettlementGatewayBox,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            gateway,
            credential: credential.into(),
            players: BTreeMap::new(),
        }
    }

    fn account_of(&self, player: u32) -> Result<AccountId, DriverError> {
        self.players
            .get(&player)
            .copied()
            .ok_or(DriverError::UnknownPlayer(player))
    }

    pub async fn apply(&mut self, command: Command) -> Result<(), DriverError> {
        debug!(?command, "applying command");
        match command.op {
            Op::Register => {
                if self.players.contains_key(&command.player) {
                    return Err(DriverError::DuplicatePlayer(command.player));
                }
                let account = self.manager.register_account().await?;
                self.players.insert(command.player, account.id);
            }
            Op::Open => {
                let account_id = self.account_of(command.player)?;
                self.manager
                    .open_session(account_id, command.game()?, command.amount()?)
                    .await?;
            }
            Op::Complete => {
                let account_id = self.account_of(command.player)?;
                let (result, payout) = (command.result()?, command.amount()?);
                let session = self
                    .manager
                    .active_session(account_id)
                    .await?
                    .ok_or(LedgerError::NoActiveSession)?;
                self.gateway
                    .complete_session(&self.credential, session.id, result, payout)
                    .await?;
            }
            Op::Abandon => {
                let account_id = self.account_of(command.player)?;
                self.manager.abandon_session(account_id).await?;
            }
            Op::Bonus => {
                let account_id = self.account_of(command.player)?;
                self.manager
                    .grant_credit(
                        account_id,
                        EntryType::Bonus,
                        command.amount()?,
                        "scripted bonus",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Final state of every registered player, ordered by player number.
    pub async fn summaries(&self) -> Result<Vec<PlayerSummary>, DriverError> {
        let mut summaries = Vec::with_capacity(self.players.len());
        for (&player, &account_id) in &self.players {
            let summary = match self.manager.account(account_id).await {
                Ok(account) => {
                    let sessions = self.manager.sessions(account_id).await?;
                    PlayerSummary {
                        player,
                        account: account_id.to_string(),
                        balance_cents: Some(account.balance_cents.value()),
                        active_session: sessions.iter().any(|s| s.is_active()),
                        sessions: sessions.len(),
                        state: "active",
                    }
                }
                Err(LedgerError::NotFound) => PlayerSummary {
                    player,
                    account: account_id.to_string(),
                    balance_cents: None,
                    sessions: 0,
                    active_session: false,
                    state: "deleted",
                },
                Err(e) => return Err(e.into()),
            };
            summaries.push(summary);
        }
        Ok(summaries)
    }
}
