pub mod csv;
pub mod simulator;
