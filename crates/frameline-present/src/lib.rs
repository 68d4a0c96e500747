//! Frame presentation tracking.
//!
//! Consumes the normalized trace records from `frameline-trace` and
//! reconstructs per-frame present lifecycles: which API call produced a
//! frame, how it traveled through the display kernel and compositor, when
//! its content was ready, and when (or whether) it reached the screen.
//!
//! A [`PresentTracker`] is fed records from one thread via
//! [`PresentTracker::handle_event`]; finished [`Present`]s come out of the
//! shared [`DeliveryQueues`], which another thread may drain concurrently.

mod delivery;
mod gpu;
mod handlers;
mod indices;
mod present;
mod registry;
mod router;
mod tracker;

pub use delivery::{DeliveryQueues, DrainQueue, ProcessUpdate};
pub use gpu::CloudEncodeFrame;
pub use present::{Present, PresentMode, PresentResult, Runtime, SurfaceToken};
pub use registry::DEFAULT_RING_CAPACITY;
pub use tracker::{PresentTracker, ProcessFilter, TrackerSettings};
