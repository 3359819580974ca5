//! Conversation primitives: the turn channel a program suspends on, the
//! per-session state it reads and writes, and the capabilities it consumes.
//!
//! A program is ordinary sequential async code:
//!
//! ```ignore
//! state.say("what's your name?").await?;
//! let name = state.user_input().await?;
//! ```
//!
//! `user_input` is the only place a program waits for the human. Drivers
//! (console, chat channels, the exchange reconciler) feed it through
//! [`ConversationState::push_user_input`].

pub mod error;
pub mod outputs;
pub mod signal;
pub mod sink;
pub mod state;
pub mod traits;
pub mod turn;

pub use error::ConversationError;
pub use outputs::Outputs;
pub use signal::Signal;
pub use sink::{NullSink, ResponseBuffer};
pub use state::{generate_session_id, ConversationState, Entry, OutOfContextGuard, Speaker};
pub use traits::{program_fn, ContextHandler, FnProgram, OutputSink, Program, SayFallback};
pub use turn::TurnChannel;
