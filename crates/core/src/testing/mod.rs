//! Testing utilities and mock model implementations.
//!
//! The mocks stand in for the external separation and alignment programs so
//! the workflows can be exercised end to end without any model installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use jellysing_core::testing::{ConcurrencyProbe, MockAligner, MockSeparator};
//!
//! let probe = ConcurrencyProbe::new();
//! let separator = MockSeparator::new().with_probe(probe.clone());
//! let aligner = MockAligner::new().with_probe(probe.clone());
//! separator.set_delay(Duration::from_millis(50));
//!
//! // ... run concurrent jobs ...
//! assert_eq!(probe.max_active(), 1);
//! ```

mod mock_aligner;
mod mock_separator;
mod probe;

pub use mock_aligner::MockAligner;
pub use mock_separator::{MockSeparator, RecordedSeparation};
pub use probe::{ConcurrencyProbe, ProbeGuard};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::config::{
        AlignmentConfig, AuthConfig, AuthMethod, Config, JobsConfig, SeparationConfig,
        ServerConfig, StorageConfig,
    };

    /// The 17-byte upload used throughout the tests.
    pub const CLIP_BYTES: &[u8] = b"RIFF...fakebytes\n";

    /// A config rooted at `data_dir`, with fast polling and no auth.
    pub fn config(data_dir: &Path) -> Config {
        Config {
            auth: AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            },
            server: ServerConfig::default(),
            storage: StorageConfig {
                data_dir: data_dir.to_path_buf(),
                ..Default::default()
            },
            jobs: JobsConfig {
                poll_interval_ms: 10,
                heartbeat_ticks: 2,
                ..Default::default()
            },
            separation: SeparationConfig::default(),
            alignment: AlignmentConfig::default(),
        }
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
