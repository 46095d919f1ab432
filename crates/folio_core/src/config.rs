//! Configuration for the checkpoint store.

/// Number of checkpoints kept by default.
pub const DEFAULT_RETENTION: usize = 10;

/// Configuration for checkpoint creation and pruning.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// How many checkpoints to keep. Never less than one.
    pub retention: usize,
}

impl CheckpointConfig {
    /// Creates a configuration keeping `retention` checkpoints.
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
        }
    }

    /// Sets the retention limit.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
