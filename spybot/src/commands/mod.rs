//! Chat commands: parsing, authorization and the subscription manager.

pub mod guard;
pub mod listener;
pub mod manager;
pub mod parser;
pub mod types;

pub use guard::OperatorGuard;
pub use listener::{CommandListener, UpdateSource};
pub use manager::SubscriptionManager;
pub use parser::{is_command, parse_command};
pub use types::{AccountRef, Command};
