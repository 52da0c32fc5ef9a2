pub mod alignment;
pub mod auth;
pub mod cache;
pub mod config;
pub mod digest;
pub mod gate;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod testing;
pub mod upload;

pub use alignment::{
    AlignableCharset, AlignmentRequest, AlignmentSegment, AlignmentTask, LyricLine, LyricSegment,
    ReferenceTrack,
};
pub use auth::{
    create_authenticator, AuthError, Authenticator, Caller, Credentials, NoneAuthenticator,
};
pub use cache::{CacheEntry, CacheError, ResultCache};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, SanitizedConfig,
};
pub use digest::{ContentDigest, ContentHasher, DigestParseError, HashedContent};
pub use gate::{AdmissionGate, AdmissionPermit, GateClosed, GateStatus};
pub use model::{Aligner, CommandAligner, CommandSeparator, ModelError, Separator};
pub use orchestrator::{JobOutcome, Orchestrator, PreparedAlignment, RejectReason};
pub use progress::{progress_channel, EventPayload, ProgressEvent, ProgressSink};
pub use runner::{JobKind, JobRunner};
pub use upload::{sanitize_extension, UploadError, UploadSession};
