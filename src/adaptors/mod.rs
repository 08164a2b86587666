//! Pipeline adaptors and combinators.
//!
//! Adaptors transform one sender into another; combinators compose several.
//! Each is available as a free function here and as a method on
//! [`crate::SenderExt`]. Composition is lazy: nothing runs until the
//! resulting sender is connected and started.

pub mod bulk;
pub mod let_;
pub mod retry;
pub mod then;
pub mod transfer;
pub mod upon;
pub mod when_all;
pub mod when_any;

pub use bulk::{bulk, bulk_chunked, bulk_unchunked, Policy};
pub use let_::{let_error, let_stopped, let_value};
pub use retry::{retry, retry_if, retry_n, retry_with_backoff, BackoffPolicy};
pub use then::then;
pub use transfer::transfer;
pub use upon::{upon_error, upon_stopped};
pub use when_all::{when_all, when_all3, when_all4, when_all5, when_all_vec};
pub use when_any::{when_any, when_any3, when_any_vec, WhenAny3Result, WhenAnyResult};
