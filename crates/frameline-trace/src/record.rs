use std::fmt;

/// Identity of the subsystem that emitted a trace event.
///
/// Each provider has its own event-id namespace; see [`crate::events`] for the
/// per-provider id enums.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Modern swap-chain present API instrumentation.
    ModernRuntime,
    /// Legacy device present API instrumentation.
    LegacyRuntime,
    /// Kernel display driver: queue packets, flips, blits, sync interrupts.
    DisplayKernel,
    /// Window-session layer: composition-surface tokens and input capture.
    WindowSession,
    /// Desktop compositor internals: handoff scheduling and flip chains.
    Compositor,
    /// Process lifetime notifications (start/stop with image name).
    Process,
    /// Vendor frame-pacing sidecar.
    FramePacer,
}

/// A single named field value decoded from a provider-specific record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    U32(u32),
    U64(u64),
    Str(String),
    U64Array(Vec<u64>),
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::U32(_) => "u32",
            FieldValue::U64(_) => "u64",
            FieldValue::Str(_) => "str",
            FieldValue::U64Array(_) => "u64-array",
        }
    }
}

/// Error returned by the typed field accessors on [`EventRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldError {
    Missing { name: &'static str },
    WrongType { name: &'static str, found: &'static str },
    IndexOutOfRange { name: &'static str, index: usize, len: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing { name } => write!(f, "field `{name}` is missing"),
            FieldError::WrongType { name, found } => {
                write!(f, "field `{name}` has unexpected type {found}")
            }
            FieldError::IndexOutOfRange { name, index, len } => {
                write!(f, "field `{name}` index {index} out of range (len {len})")
            }
        }
    }
}

impl std::error::Error for FieldError {}

/// One decoded trace event.
///
/// Records are produced by a capture backend in strict timestamp order and
/// consumed by the engine on a single dispatch thread. Timestamps are
/// monotonic ticks from the capture clock; the engine never converts them.
///
/// Field names come from the provider's event schema. A typical record
/// carries two to five fields, so fields are kept in a small vector and
/// looked up linearly.
#[derive(Clone, Debug)]
pub struct EventRecord {
    pub provider: Provider,
    pub event_id: u16,
    pub version: u8,
    pub timestamp: u64,
    pub process_id: u32,
    pub thread_id: u32,
    fields: Vec<(&'static str, FieldValue)>,
}

impl EventRecord {
    pub fn new(
        provider: Provider,
        event_id: u16,
        timestamp: u64,
        process_id: u32,
        thread_id: u32,
    ) -> Self {
        Self {
            provider,
            event_id,
            version: 0,
            timestamp,
            process_id,
            thread_id,
            fields: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn with_u32(mut self, name: &'static str, value: u32) -> Self {
        self.fields.push((name, FieldValue::U32(value)));
        self
    }

    pub fn with_u64(mut self, name: &'static str, value: u64) -> Self {
        self.fields.push((name, FieldValue::U64(value)));
        self
    }

    pub fn with_str(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, FieldValue::Str(value.into())));
        self
    }

    pub fn with_u64_array(mut self, name: &'static str, values: Vec<u64>) -> Self {
        self.fields.push((name, FieldValue::U64Array(values)));
        self
    }

    fn field(&self, name: &'static str) -> Result<&FieldValue, FieldError> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or(FieldError::Missing { name })
    }

    pub fn u32(&self, name: &'static str) -> Result<u32, FieldError> {
        match self.field(name)? {
            FieldValue::U32(v) => Ok(*v),
            other => Err(FieldError::WrongType { name, found: other.type_name() }),
        }
    }

    /// Reads a field as `u64`, widening a `u32` field transparently.
    ///
    /// Several providers widened fields across schema versions (e.g. token
    /// counts); accepting both spares every handler a version check.
    pub fn u64(&self, name: &'static str) -> Result<u64, FieldError> {
        match self.field(name)? {
            FieldValue::U64(v) => Ok(*v),
            FieldValue::U32(v) => Ok(u64::from(*v)),
            other => Err(FieldError::WrongType { name, found: other.type_name() }),
        }
    }

    pub fn str(&self, name: &'static str) -> Result<&str, FieldError> {
        match self.field(name)? {
            FieldValue::Str(v) => Ok(v.as_str()),
            other => Err(FieldError::WrongType { name, found: other.type_name() }),
        }
    }

    pub fn u64_array(&self, name: &'static str) -> Result<&[u64], FieldError> {
        match self.field(name)? {
            FieldValue::U64Array(v) => Ok(v.as_slice()),
            other => Err(FieldError::WrongType { name, found: other.type_name() }),
        }
    }

    pub fn u64_at(&self, name: &'static str, index: usize) -> Result<u64, FieldError> {
        let values = self.u64_array(name)?;
        values
            .get(index)
            .copied()
            .ok_or(FieldError::IndexOutOfRange { name, index, len: values.len() })
    }
}
