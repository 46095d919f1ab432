//! Configuration for the sync engine.

use crate::provider::{AuthStrategy, Platform};
use folio_core::DEFAULT_RETENTION;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Default debounce window for scheduled syncs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(60);

/// Checkpoint trigger used before scheduled cycles.
pub const PRE_SYNC_TRIGGER: &str = "pre-sync";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device ID (unique per device).
    pub device_id: String,
    /// Device display name written to the device registry.
    pub device_name: String,
    /// Platform written to the device registry.
    pub platform: String,
    /// Quiet period before a scheduled sync runs.
    pub debounce: Duration,
    /// Retry configuration for conflicts and network failures.
    pub retry: RetryConfig,
    /// Number of checkpoints kept.
    pub checkpoint_retention: usize,
    /// Minimum age of the last pre-sync checkpoint before a scheduled cycle
    /// takes another one.
    pub auto_checkpoint_interval: Duration,
    /// Trigger name for checkpoints taken by scheduled cycles.
    pub pre_sync_trigger: String,
}

impl SyncConfig {
    /// Creates a new sync configuration for `device_id`.
    pub fn new(device_id: impl Into<String>) -> Self {
        let device_id = device_id.into();
        Self {
            device_name: device_id.clone(),
            device_id,
            platform: Platform::current().as_str().to_string(),
            debounce: DEFAULT_DEBOUNCE,
            retry: RetryConfig::default(),
            checkpoint_retention: DEFAULT_RETENTION,
            auto_checkpoint_interval: Duration::from_secs(60),
            pre_sync_trigger: PRE_SYNC_TRIGGER.to_string(),
        }
    }

    /// Creates a configuration with a random device id.
    pub fn with_random_device() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Sets the device display name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Sets the platform.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how many checkpoints are kept.
    pub fn with_checkpoint_retention(mut self, retention: usize) -> Self {
        self.checkpoint_retention = retention.max(1);
        self
    }

    /// Sets the automatic checkpoint throttle.
    pub fn with_auto_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.auto_checkpoint_interval = interval;
        self
    }

    /// Sets the trigger name for scheduled-cycle checkpoints.
    pub fn with_pre_sync_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.pre_sync_trigger = trigger.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::with_random_device()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Which remote storage provider to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// In-process provider, for tests and dry runs.
    Memory,
    /// A local or mounted folder holding `manifest.json`.
    Directory(PathBuf),
}

/// Provider selection plus the auth strategy it signs in with.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider variant.
    pub kind: ProviderKind,
    /// Sign-in strategy.
    pub auth: AuthStrategy,
}

impl ProviderConfig {
    /// Creates a configuration for `kind`, picking the auth strategy from
    /// the running platform.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            auth: AuthStrategy::for_current_platform(),
        }
    }

    /// A folder-backed provider rooted at `root`.
    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self::new(ProviderKind::Directory(root.into()))
    }

    /// Overrides the auth strategy.
    pub fn with_auth(mut self, auth: AuthStrategy) -> Self {
        self.auth = auth;
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(ProviderKind::Memory).with_auth(AuthStrategy::Mock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("dev-1")
            .with_device_name("Laptop")
            .with_platform("linux")
            .with_debounce(Duration::from_secs(5))
            .with_checkpoint_retention(0);

        assert_eq!(config.device_id, "dev-1");
        assert_eq!(config.device_name, "Laptop");
        assert_eq!(config.platform, "linux");
        assert_eq!(config.debounce, Duration::from_secs(5));
        assert_eq!(config.checkpoint_retention, 1);
        assert_eq!(config.pre_sync_trigger, "pre-sync");
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::new("d");
        assert_eq!(config.debounce, Duration::from_secs(60));
        assert_eq!(config.checkpoint_retention, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(uuid::Uuid::parse_str(&SyncConfig::default().device_id).is_ok());
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn provider_config_directory() {
        let config = ProviderConfig::directory("/tmp/remote").with_auth(AuthStrategy::Mock);
        assert_eq!(
            config.kind,
            ProviderKind::Directory(PathBuf::from("/tmp/remote"))
        );
        assert_eq!(config.auth, AuthStrategy::Mock);
    }
}
