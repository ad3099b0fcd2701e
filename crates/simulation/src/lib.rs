//! Simulation harness for the openstake protocol.
//!
//! Provides:
//! - [`SimHarness`]: a deployed network with funded accounts and helpers
//!   for the multi-step flows (validator + pool bootstrap, staking,
//!   reward simulation, time travel)
//! - [`check_invariants`]: conservation and membership checks run after
//!   every mutation in the integration scenarios
//! - [`StaticNamingService`]: a canned naming-service collaborator

mod harness;
mod invariants;

pub use harness::{SimHarness, StaticNamingService};
pub use invariants::check_invariants;
