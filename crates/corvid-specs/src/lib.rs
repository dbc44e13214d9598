//! corvid-specs: generated-style conformance clients for the corvid runtime
//!
//! Each module holds the models and client for one service surface:
//! - [`birds`]: an extensible discriminated union (`Bird`)
//! - [`fish`]: a fixed discriminated union (`Fish`)
//! - [`widgets`]: a paged list
//! - [`jobs`]: a long-running create
//!
//! [`fake`] holds one fake server per client plus the [`fake::ServerFactory`]
//! that routes between them.

pub mod birds;
mod client;
pub mod fake;
pub mod fish;
pub mod jobs;
pub mod widgets;

pub use birds::{Bird, BirdsClient};
pub use fish::{Fish, FishClient};
pub use jobs::{Job, JobSpec, JobsClient};
pub use widgets::{Widget, WidgetsClient};
