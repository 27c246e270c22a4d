//! `timekeeper-core` — shared configuration, types, and errors.
//!
//! Everything here is dependency-light so every other crate in the
//! workspace can pull it in without dragging HTTP or database stacks along.

pub mod config;
pub mod error;
pub mod types;

pub use config::TimekeeperConfig;
pub use error::{Result, TimekeeperError};
pub use types::{ClockStatus, ExecutionStatus, HttpMethod, Management};
