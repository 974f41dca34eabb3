//! Channel configuration.

/// Configuration for a channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Stamp every appended entry with its event id.
    pub event_ids: bool,
    /// Set the commitment flag on accept entries written by `flush`.
    pub commit_on_flush: bool,
    /// Appends that may wait for the pipeline worker before callers block.
    pub queue_capacity: usize,
    /// Most entries written by a single feed append.
    pub max_batch_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_ids: true,
            commit_on_flush: true,
            queue_capacity: 1024,
            max_batch_size: 256,
        }
    }
}
