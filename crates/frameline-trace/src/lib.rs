//! Decoded trace-event records for the frameline present engine.
//!
//! This crate intentionally stays dependency-free: it is the boundary between
//! capture backends (live session or log replay) and the correlation engine.
//! A backend decodes each provider-specific binary record into an
//! [`EventRecord`] carrying the provider identity, event id/version, header
//! fields, and a schema-driven bag of named typed fields; the engine never
//! sees raw provider bytes.

mod events;
mod record;

pub use events::{
    CompositorEvent, DisplayEvent, EngineClass, FlipEntryStatus, HistoryModel, PacerEvent,
    PacketType, ProcessEvent, RuntimeEvent, TokenState, WindowEvent, MMIO_FLIP_IMMEDIATE,
    PRESENT_FLAG_DO_NOT_SEQUENCE, PRESENT_FLAG_PROBE, PRESENT_FLAG_RESTART, PRESENT_RESULT_FAILED,
    PRESENT_RESULT_OCCLUDED, PRESENT_RESULT_OK,
};
pub use record::{EventRecord, FieldError, FieldValue, Provider};
