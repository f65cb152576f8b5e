/// This module provides a batch delivering its items to a Tokio channel.
pub mod channel;

#[cfg(feature = "logger")]
/// This module provides a batch logging its items, useful for debugging purposes.
pub mod logger;
