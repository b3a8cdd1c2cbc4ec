//! CSV adapters for scripted simulator runs.

pub mod command_reader;
pub mod summary_writer;
