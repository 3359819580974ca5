//! Session management: hosts one conversation program per session id.

pub mod container;
pub mod escalation;
pub mod registry;
pub mod traits;

pub use container::SessionContainer;
pub use escalation::{EscalationHandshake, ExchangeEscalation};
pub use registry::SessionRegistry;
pub use traits::{SessionOptions, SessionStatus};
