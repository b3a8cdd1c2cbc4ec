use crate::domain::session::{GameKind, Outcome};
use crate::error::DriverError;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Create the player's account with the starting bankroll.
    Register,
    /// Open a session: needs `game` and `amount` (the bet).
    Open,
    /// Settle the player's active session through the gateway: needs
    /// `result` and `amount` (the payout).
    Complete,
    /// Forfeit the player's active session.
    Abandon,
    /// Non-session credit of `amount`.
    Bonus,
}

/// One scripted player command.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct Command {
    pub op: Op,
    pub player: u32,
    pub game: Option<GameKind>,
    pub amount: Option<i64>,
    pub result: Option<Outcome>,
}

impl Command {
    pub fn game(&self) -> Result<GameKind, DriverError> {
        self.game.ok_or(DriverError::MissingField("game"))
    }

    pub fn amount(&self) -> Result<i64, DriverError> {
        self.amount.ok_or(DriverError::MissingField("amount"))
    }

    pub fn result(&self) -> Result<Outcome, DriverError> {
        self.result.ok_or(DriverError::MissingField("result"))
    }
}

/// Reads player commands from a CSV source with the header
/// `op,player,game,amount,result`.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands; a malformed row yields an error without
    /// ending the stream.
    pub fn commands(self) -> impl Iterator<Item = Result<Command, DriverError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(DriverError::from))
    }
}
