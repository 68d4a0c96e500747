//! The in-flight present entity and its classification enums.

/// Stable handle to a present in the registry arena.
///
/// Every correlation index, ring slot, and dependent list refers to presents
/// through `SlotId`; the arena is the single owner. A `SlotId` is only valid
/// while the present is live in the arena — removal is the single source of
/// truth for "does this present still exist".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which present API (if any) originated the present.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Runtime {
    /// No instrumented runtime call was observed; tracking started at the
    /// kernel layer.
    Other,
    /// Modern swap-chain present API.
    Modern,
    /// Legacy device present API.
    Legacy,
    /// Synthesized from a cloud-streaming video-encode completion.
    CloudStreaming,
}

/// How the frame reached (or was meant to reach) the screen.
///
/// The mode starts `Unknown` and only ever narrows as events arrive; the
/// independent-flip variants are refinements of a composed present that the
/// kernel promoted to direct scanout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentMode {
    Unknown,
    /// Fullscreen flip through the legacy flip queue.
    HardwareLegacyFlip,
    /// Copy straight into the front buffer.
    HardwareLegacyCopy,
    HardwareIndependentFlip,
    HardwareComposedIndependentFlip,
    ComposedFlip,
    ComposedCopyGpu,
    ComposedCopyCpu,
    ComposedCompositionAtlas,
}

impl PresentMode {
    /// Narrowing rank: a present's mode may only move to an equal-or-higher
    /// rank over its lifetime. A would-be regression means tracking was lost
    /// and the present must be evicted, not mutated.
    pub fn specificity(self) -> u8 {
        match self {
            PresentMode::Unknown => 0,
            PresentMode::HardwareLegacyFlip
            | PresentMode::HardwareLegacyCopy
            | PresentMode::ComposedFlip
            | PresentMode::ComposedCopyGpu
            | PresentMode::ComposedCopyCpu
            | PresentMode::ComposedCompositionAtlas => 1,
            PresentMode::HardwareIndependentFlip => 2,
            PresentMode::HardwareComposedIndependentFlip => 3,
        }
    }
}

/// Terminal outcome of a present.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentResult {
    Unknown,
    Presented,
    Discarded,
    Error,
}

/// Composition-surface token tuple used for the window-session handoff.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceToken {
    pub surface: u64,
    pub present_count: u64,
    pub bind_id: u64,
}

/// One request to display a rendered frame on a swap chain.
///
/// Constructed from the first event observed for the present (usually a
/// runtime `PresentStart`, otherwise synthesized at the kernel layer) and
/// filled in incrementally. All timestamps are monotonic capture-clock ticks;
/// zero means "not observed".
#[derive(Clone, Debug)]
pub struct Present {
    pub process_id: u32,
    pub thread_id: u32,
    pub created: u64,
    pub swapchain: u64,
    pub runtime: Runtime,
    pub mode: PresentMode,
    pub result: PresentResult,

    pub sync_interval: i32,
    pub flags: u32,
    pub dest_width: u32,
    pub dest_height: u32,
    pub supports_tearing: bool,
    pub mmio: bool,

    /// Time from the runtime call start until it returned.
    pub time_in_call: u64,
    /// When all GPU work for the frame had drained.
    pub ready_time: u64,
    /// When the frame was shown (or would have been).
    pub screen_time: u64,
    pub gpu_duration: u64,
    pub gpu_video_duration: u64,
    /// Most recent input-capture timestamp folded into this frame.
    pub input_time: Option<u64>,
    /// Vendor frame-pacer timestamps, when the swap chain is paced.
    pub pacer_scheduled_time: Option<u64>,
    pub pacer_flip_time: Option<u64>,

    // Correlation keys. Zero is "not held" for the integer keys.
    pub submit_sequence: u32,
    pub history_token: u64,
    pub surface_token: Option<SurfaceToken>,
    pub legacy_blit_token: u64,
    pub driver_context: u64,
    pub window: u64,
    /// Driver thread that finished a batched present on our behalf.
    pub batch_thread_id: u32,

    pub seen_kernel_present: bool,
    pub seen_window_token: bool,
    pub compositor_notified: bool,
    pub completed: bool,
    pub lost: bool,

    pub(crate) in_compositor_wait_list: bool,
    /// Deferred-delivery reasons: a completed present may briefly wait for
    /// the runtime call to return or for frame-pacer data before release.
    pub(crate) awaiting_return: bool,
    pub(crate) awaiting_pacer: bool,
    /// Drain cycles left before a still-waiting present is released anyway.
    pub(crate) defer_budget: u8,

    pub(crate) ring_index: usize,
    pub(crate) dependents: Vec<SlotId>,
}

pub(crate) const NO_RING_SLOT: usize = usize::MAX;

/// How many delivery passes a present may hold up its swap chain, either
/// while waiting for a late side-channel event or while blocking completed
/// work queued behind it.
pub(crate) const DEFER_BUDGET: u8 = 3;

impl Present {
    pub(crate) fn new(
        process_id: u32,
        thread_id: u32,
        timestamp: u64,
        runtime: Runtime,
    ) -> Self {
        Self {
            process_id,
            thread_id,
            created: timestamp,
            swapchain: 0,
            runtime,
            mode: PresentMode::Unknown,
            result: PresentResult::Unknown,
            sync_interval: -1,
            flags: 0,
            dest_width: 0,
            dest_height: 0,
            supports_tearing: false,
            mmio: false,
            time_in_call: 0,
            ready_time: 0,
            screen_time: 0,
            gpu_duration: 0,
            gpu_video_duration: 0,
            input_time: None,
            pacer_scheduled_time: None,
            pacer_flip_time: None,
            submit_sequence: 0,
            history_token: 0,
            surface_token: None,
            legacy_blit_token: 0,
            driver_context: 0,
            window: 0,
            batch_thread_id: 0,
            seen_kernel_present: false,
            seen_window_token: false,
            compositor_notified: false,
            completed: false,
            lost: false,
            in_compositor_wait_list: false,
            awaiting_return: false,
            awaiting_pacer: false,
            defer_budget: DEFER_BUDGET,
            ring_index: NO_RING_SLOT,
            dependents: Vec::new(),
        }
    }

    /// Whether delivery of this (completed) present is still gated on a late
    /// side-channel event.
    pub(crate) fn wait_pending(&self) -> bool {
        (self.awaiting_return || self.awaiting_pacer) && self.defer_budget > 0
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.completed || self.lost
    }
}
