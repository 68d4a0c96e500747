//! Per-provider event-id namespaces and shared field-value enums.
//!
//! Every provider assigns small dense ids to its events; `from_id` returns
//! `None` for ids the engine does not understand so unknown events can be
//! skipped without tearing down the session.

/// Present-call flags shared by both runtime providers.
///
/// Probe presents only test whether the target is still presentable and never
/// reach the display path; do-not-sequence presents may be confirmed by the
/// compositor without ever being shown.
pub const PRESENT_FLAG_PROBE: u32 = 1 << 0;
pub const PRESENT_FLAG_DO_NOT_SEQUENCE: u32 = 1 << 1;
pub const PRESENT_FLAG_RESTART: u32 = 1 << 2;

/// Events emitted by the runtime present-API providers (modern and legacy).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum RuntimeEvent {
    PresentStart = 1,
    PresentStop = 2,
}

impl RuntimeEvent {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::PresentStart),
            2 => Some(Self::PresentStop),
            _ => None,
        }
    }
}

/// Events emitted by the kernel display driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum DisplayEvent {
    Flip = 1,
    FlipMultiPlane = 2,
    QueuePacketStart = 3,
    QueuePacketStop = 4,
    MmioFlip = 5,
    MmioFlipMultiPlane = 6,
    VsyncInterrupt = 7,
    HsyncInterrupt = 8,
    KernelPresent = 9,
    PresentHistory = 10,
    PresentHistoryDetailed = 11,
    PresentHistoryRetired = 12,
    Blit = 13,
    BlitCancel = 14,
    DeviceStart = 15,
    DeviceStop = 16,
    ContextStart = 17,
    ContextStop = 18,
    EngineMetadata = 19,
    DmaPacketStart = 20,
    DmaPacketComplete = 21,
    /// Rundown of a device that existed before capture started.
    DeviceSnapshot = 22,
    /// Rundown of a context that existed before capture started.
    ContextSnapshot = 23,
}

impl DisplayEvent {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::Flip),
            2 => Some(Self::FlipMultiPlane),
            3 => Some(Self::QueuePacketStart),
            4 => Some(Self::QueuePacketStop),
            5 => Some(Self::MmioFlip),
            6 => Some(Self::MmioFlipMultiPlane),
            7 => Some(Self::VsyncInterrupt),
            8 => Some(Self::HsyncInterrupt),
            9 => Some(Self::KernelPresent),
            10 => Some(Self::PresentHistory),
            11 => Some(Self::PresentHistoryDetailed),
            12 => Some(Self::PresentHistoryRetired),
            13 => Some(Self::Blit),
            14 => Some(Self::BlitCancel),
            15 => Some(Self::DeviceStart),
            16 => Some(Self::DeviceStop),
            17 => Some(Self::ContextStart),
            18 => Some(Self::ContextStop),
            19 => Some(Self::EngineMetadata),
            20 => Some(Self::DmaPacketStart),
            21 => Some(Self::DmaPacketComplete),
            22 => Some(Self::DeviceSnapshot),
            23 => Some(Self::ContextSnapshot),
            _ => None,
        }
    }
}

/// Queue-packet type carried by `DisplayEvent::QueuePacketStart`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    Dma = 0,
    Software = 1,
    Paging = 2,
    MmioFlip = 3,
    Wait = 4,
    Signal = 5,
}

impl PacketType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Dma),
            1 => Some(Self::Software),
            2 => Some(Self::Paging),
            3 => Some(Self::MmioFlip),
            4 => Some(Self::Wait),
            5 => Some(Self::Signal),
            _ => None,
        }
    }
}

/// Engine class carried by `DisplayEvent::EngineMetadata`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum EngineClass {
    Other = 0,
    VideoDecode = 1,
    VideoEncode = 2,
    VideoProcessing = 3,
}

impl EngineClass {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Other),
            1 => Some(Self::VideoDecode),
            2 => Some(Self::VideoEncode),
            3 => Some(Self::VideoProcessing),
            _ => None,
        }
    }

    pub fn is_video(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Redirection model carried by present-history submissions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum HistoryModel {
    Unknown = 0,
    RedirectedBlt = 1,
    RedirectedCpuBlt = 2,
    RedirectedFlip = 3,
    CompositionAtlas = 4,
    /// GDI-internal redirection; carries no presentable frame.
    RedirectedGdi = 5,
}

impl HistoryModel {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::RedirectedBlt),
            2 => Some(Self::RedirectedCpuBlt),
            3 => Some(Self::RedirectedFlip),
            4 => Some(Self::CompositionAtlas),
            5 => Some(Self::RedirectedGdi),
            _ => None,
        }
    }
}

/// `MmioFlip` flag: the flip bypassed the vsync queue and hit the screen
/// immediately (tearing allowed).
pub const MMIO_FLIP_IMMEDIATE: u32 = 1 << 0;

/// Runtime present-call results carried by `RuntimeEvent::PresentStop`.
///
/// Only `RESULT_OK` allows the present to continue through the display path;
/// occluded and failed calls terminate at the runtime boundary.
pub const PRESENT_RESULT_OK: u32 = 0;
pub const PRESENT_RESULT_OCCLUDED: u32 = 1;
pub const PRESENT_RESULT_FAILED: u32 = 2;

/// Flip-queue entry status carried by `DisplayEvent::MmioFlipMultiPlane`
/// (schema version 2 and later).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum FlipEntryStatus {
    WaitVsync = 1,
    WaitHsync = 2,
    WaitComplete = 3,
}

impl FlipEntryStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::WaitVsync),
            2 => Some(Self::WaitHsync),
            3 => Some(Self::WaitComplete),
            _ => None,
        }
    }
}

/// Events emitted by the window-session layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum WindowEvent {
    TokenIssued = 1,
    TokenStateChanged = 2,
    InputDeviceRead = 3,
}

impl WindowEvent {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::TokenIssued),
            2 => Some(Self::TokenStateChanged),
            3 => Some(Self::InputDeviceRead),
            _ => None,
        }
    }
}

/// Composition-token lifecycle states carried by `WindowEvent::TokenStateChanged`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TokenState {
    InFrame = 1,
    Confirmed = 2,
    Retired = 3,
    Discarded = 4,
}

impl TokenState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::InFrame),
            2 => Some(Self::Confirmed),
            3 => Some(Self::Retired),
            4 => Some(Self::Discarded),
            _ => None,
        }
    }
}

/// Events emitted by the desktop compositor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum CompositorEvent {
    PresentHistoryNotify = 1,
    SchedulePresent = 2,
    FlipChainPending = 3,
    FlipChainComplete = 4,
    FlipChainDirty = 5,
    SurfaceUpdateScheduled = 6,
}

impl CompositorEvent {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::PresentHistoryNotify),
            2 => Some(Self::SchedulePresent),
            3 => Some(Self::FlipChainPending),
            4 => Some(Self::FlipChainComplete),
            5 => Some(Self::FlipChainDirty),
            6 => Some(Self::SurfaceUpdateScheduled),
            _ => None,
        }
    }
}

/// Process lifetime notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum ProcessEvent {
    Started = 1,
    Stopped = 2,
}

impl ProcessEvent {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::Started),
            2 => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// Events emitted by the vendor frame-pacing sidecar.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum PacerEvent {
    SessionStart = 1,
    SessionStop = 2,
    FrameComplete = 3,
}

impl PacerEvent {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::SessionStart),
            2 => Some(Self::SessionStop),
            3 => Some(Self::FrameComplete),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_round_trip() {
        for id in 1..=23u16 {
            let event = DisplayEvent::from_id(id).expect("dense id range");
            assert_eq!(event as u16, id);
        }
        assert_eq!(DisplayEvent::from_id(0), None);
        assert_eq!(DisplayEvent::from_id(24), None);
        assert_eq!(RuntimeEvent::from_id(2), Some(RuntimeEvent::PresentStop));
        assert_eq!(TokenState::from_u32(3), Some(TokenState::Retired));
        assert_eq!(TokenState::from_u32(9), None);
    }

    #[test]
    fn engine_class_video_split() {
        assert!(!EngineClass::Other.is_video());
        assert!(EngineClass::VideoDecode.is_video());
        assert!(EngineClass::VideoEncode.is_video());
    }
}
