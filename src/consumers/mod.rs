//! Consumers: drive pipelines to completion from synchronous call sites.

pub mod start_detached;
pub mod sync_wait;

pub use start_detached::start_detached;
pub use sync_wait::{sync_wait, sync_wait_with_env};
