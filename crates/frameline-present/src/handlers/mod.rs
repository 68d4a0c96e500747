//! Per-provider event semantics, split by origin. Each module extends
//! [`PresentTracker`](crate::tracker::PresentTracker) with the handlers the
//! router dispatches to.

mod compositor;
mod display;
mod pacer;
mod process;
mod runtime;
mod window;
