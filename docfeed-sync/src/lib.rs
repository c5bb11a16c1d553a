pub mod backoff;
pub mod config;
mod error;
pub mod logging;
pub mod retry;
mod syncer;
pub mod tree;

pub use config::SyncConfig;
pub use error::{Disposition, Phase, PreconditionError, SyncError, Transient};
pub use retry::RetryPolicy;
pub use syncer::Syncer;
pub use tree::{NodeId, Resource, ResourceTree, State};
