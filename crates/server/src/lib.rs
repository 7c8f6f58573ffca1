//! Transaction core for a ticked voxel world.
//!
//! A [`WorldHandle`] serializes every access to one `World` through a bounded
//! FIFO queue consumed by a single executor thread. Around it run a fixed-rate
//! tick driver, an auto-save worker and a deadlock watchdog, all stopped
//! together by [`WorldHandle::close`].

pub mod autosave;
pub mod block;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
mod executor;
pub mod generator;
pub mod handler;
pub mod lifecycle;
pub mod persistence;
pub mod provider;
mod queue;
pub mod rules;
pub mod tick;
pub mod transaction;
pub mod watchdog;
pub mod world;

pub use config::{Config, SaveInterval, Tuning};
pub use error::ExecError;
pub use transaction::{Origin, Pending, Tx};
pub use world::{WeakWorldHandle, WorldHandle};
