// Stacks - fluent cron schedules, retrying jobs and queue workers for Rust
//
// This crate re-exports the workspace crates behind feature flags so an
// application can depend on a single package.

// Jobs, actions, retries and workers are always available
pub use stacks_queue::*;

pub use stacks_log;
pub use stacks_queue;

#[cfg(feature = "cron")]
pub use stacks_cron;

#[cfg(feature = "config")]
pub use stacks_config;

// Prelude for common imports
pub mod prelude {
    pub use stacks_queue::prelude::*;

    #[cfg(feature = "cron")]
    pub use stacks_cron::prelude::*;

    #[cfg(feature = "config")]
    pub use stacks_config::{AppConfig, ConfigManager, Validate};
}
