// bugsync-core: Offline-first reconciliation engine for the bug tracker.
//
// Keeps a local collection of bugs in step with the server across
// unreliable connectivity: edits made while the server is unreachable are
// queued in the durable cache and replayed when it comes back, and push
// events from the live channel are merged as they arrive.

pub mod cache;
pub mod config;
mod convert;
pub mod engine;
pub mod error;
mod live;
mod locks;
pub mod model;
pub mod remote;
pub mod store;
pub mod stream;
pub mod sync;

pub use cache::{BugCache, CREDENTIAL_KEY, CacheOp, FileCache, MemoryCache};
pub use config::EngineConfig;
pub use engine::{DeleteOutcome, FetchOutcome, SaveOutcome, SyncEngine, resolve_credential};
pub use error::CoreError;
pub use model::{Bug, BugId, SyncStatus};
pub use remote::BugRemote;
pub use store::EngineState;
pub use stream::{EngineStream, EngineWatchStream};
pub use sync::DrainReport;

// API types that appear in the engine's public surface.
pub use bugsync_api::{BugClient, LiveConfig, LiveEvent, LiveEventKind, ReconnectConfig, TlsMode};
