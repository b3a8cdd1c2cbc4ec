//! Application layer: the operations that move money.
//!
//! `SessionManager` is the entry point for opening, settling and abandoning
//! sessions. It builds every balance change on top of `AccountGuard`, and
//! `gateway` exposes the narrow settlement surface used by game-rule engines.

pub mod gateway;
pub mod guard;
pub mod lifecycle;
pub mod teardown;
