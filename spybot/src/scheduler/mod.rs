//! Scheduler module.
//!
//! Runs one self-rescheduling actor per tracked entity plus short-lived game
//! watches shared by every chat that announced the game. Actors are
//! organized in a cancellation-token hierarchy per subscription.

mod actor;
mod registry;
mod service;
mod task;
mod watch;

pub use actor::{ActorOutcome, EntityActor};
pub use registry::TaskRegistry;
pub use service::{Scheduler, SchedulerConfig};
pub use task::{MonitorTask, TaskHandle};
pub use watch::{GameWatch, WatchState, next_state};
