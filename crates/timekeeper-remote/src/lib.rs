//! `timekeeper-remote` — typed clients for the remote scheduler and the
//! remote task queue.
//!
//! Both clients speak the provider's REST API through reqwest and translate
//! HTTP failures into [`RemoteError`] variants, so callers switch on
//! `NotFound` / `PermissionDenied` instead of grepping message strings.
//! Configuration is an explicit [`RemoteConfig`] handed to the constructors;
//! there is no ambient project/region state.

pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod token;

pub use config::RemoteConfig;
pub use error::{RemoteError, Result};
pub use queue::{EnqueueRequest, HttpQueueClient, QueueApi, QueueTask};
pub use scheduler::{update_mask, HttpSchedulerClient, JobSpec, RemoteJob, SchedulerApi};
pub use token::{ServiceAccountTokens, TokenProvider};
