use crate::error::DriverError;
use serde::Serialize;
use std::io::Write;

/// Final state of one scripted player.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct PlayerSummary {
    pub player: u32,
    pub account: String,
    /// Empty once the account has been torn down.
    pub balance_cents: Option<i64>,
    pub sessions: usize,
    pub active_session: bool,
    pub state: &'static str,
}

/// Writes player summaries as CSV.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_summaries(
        &mut self,
        summaries: impl IntoIterator<Item = PlayerSummary>,
    ) -> Result<(), DriverError> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
