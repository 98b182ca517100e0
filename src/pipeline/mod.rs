//! Message pipeline.
//!
//! Every webhook event flows through:
//! 1. `gateway::classify()`: inbound, outbound or ignored
//! 2. `commands::interpret()`: operator control commands
//! 3. `AdmissionPolicy::decide()`: group, blacklist and whitelist rules
//! 4. `PauseRegistry::is_paused()`: human handoff
//! 5. `Relay`: bounded context, AI call, reply delivery

pub mod admission;
pub mod commands;
pub mod pause;
pub mod prompt;
pub mod relay;

pub use admission::{Admission, AdmissionPolicy, RejectReason};
pub use commands::Command;
pub use pause::{PauseReason, PauseRegistry};
pub use relay::{Relay, RelayOutcome, RelayStatus};
