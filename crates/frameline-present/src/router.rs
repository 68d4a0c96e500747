//! Event decoding and dispatch. Field extraction failures are logged and the
//! event is skipped; the tracked state is never left half-updated by a
//! malformed record.

use frameline_trace::{
    CompositorEvent, DisplayEvent, EngineClass, EventRecord, FieldError, FlipEntryStatus,
    HistoryModel, PacerEvent, PacketType, ProcessEvent, Provider, RuntimeEvent, TokenState,
    WindowEvent,
};

use crate::present::{Runtime, SurfaceToken};
use crate::tracker::PresentTracker;

fn field<T>(record: &EventRecord, value: Result<T, FieldError>) -> Option<T> {
    match value {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(
                provider = ?record.provider,
                event_id = record.event_id,
                error = %err,
                "malformed event skipped"
            );
            None
        }
    }
}

impl PresentTracker {
    /// Feeds one trace record through the engine. Must be called from a
    /// single thread, in trace order.
    pub fn handle_event(&mut self, record: &EventRecord) {
        match record.provider {
            Provider::ModernRuntime => self.route_runtime(record, Runtime::Modern),
            Provider::LegacyRuntime => self.route_runtime(record, Runtime::Legacy),
            Provider::DisplayKernel => self.route_display(record),
            Provider::WindowSession => self.route_window(record),
            Provider::Compositor => self.route_compositor(record),
            Provider::Process => self.route_process(record),
            Provider::FramePacer => self.route_pacer(record),
        }
    }

    fn route_runtime(&mut self, record: &EventRecord, runtime: Runtime) {
        match RuntimeEvent::from_id(record.event_id) {
            Some(RuntimeEvent::PresentStart) => {
                let Some(swapchain) = field(record, record.u64("swapchain")) else {
                    return;
                };
                let Some(flags) = field(record, record.u32("flags")) else {
                    return;
                };
                // The legacy runtime has no sync-interval argument.
                let sync_interval = record.u32("sync_interval").map(|v| v as i32).unwrap_or(-1);
                self.runtime_present_start(record, runtime, swapchain, flags, sync_interval);
            }
            Some(RuntimeEvent::PresentStop) => {
                let Some(result) = field(record, record.u32("result")) else {
                    return;
                };
                self.runtime_present_stop(record, runtime, result);
            }
            None => {}
        }
    }

    fn route_display(&mut self, record: &EventRecord) {
        match DisplayEvent::from_id(record.event_id) {
            Some(DisplayEvent::Flip) => {
                let Some(interval) = field(record, record.u32("interval")) else {
                    return;
                };
                let Some(mmio) = field(record, record.u32("mmio")) else {
                    return;
                };
                self.display_flip(record, interval as i32, mmio != 0);
            }
            Some(DisplayEvent::FlipMultiPlane) => {
                // Multi-plane flips are always MMIO and carry no interval.
                self.display_flip(record, -1, true);
            }
            Some(DisplayEvent::QueuePacketStart) => {
                let Some(packet_type) = field(record, record.u32("packet_type")) else {
                    return;
                };
                let Some(sequence) = field(record, record.u32("sequence")) else {
                    return;
                };
                let Some(context) = field(record, record.u64("context")) else {
                    return;
                };
                let Some(present) = field(record, record.u32("present")) else {
                    return;
                };
                let supports_kernel_present_event = record
                    .u32("supports_present_event")
                    .map(|v| v != 0)
                    .unwrap_or(true);
                let is_present_packet = matches!(
                    PacketType::from_u32(packet_type),
                    Some(PacketType::MmioFlip) | Some(PacketType::Software)
                ) || present != 0;
                self.display_queue_packet_start(
                    record,
                    is_present_packet,
                    sequence,
                    context,
                    supports_kernel_present_event,
                );
            }
            Some(DisplayEvent::QueuePacketStop) => {
                let Some(sequence) = field(record, record.u32("sequence")) else {
                    return;
                };
                self.display_queue_packet_stop(record, sequence);
            }
            Some(DisplayEvent::MmioFlip) => {
                let Some(sequence) = field(record, record.u32("sequence")) else {
                    return;
                };
                let Some(flags) = field(record, record.u32("flags")) else {
                    return;
                };
                self.display_mmio_flip(record, sequence, flags);
            }
            Some(DisplayEvent::MmioFlipMultiPlane) => {
                let Some(flip_id) = field(record, record.u64("flip_id")) else {
                    return;
                };
                // The entry status was added in version 2 of the event.
                let entry_status = if record.version >= 2 {
                    field(record, record.u32("entry_status")).and_then(FlipEntryStatus::from_u32)
                } else {
                    None
                };
                self.display_mmio_flip_multi_plane(record, (flip_id >> 32) as u32, entry_status);
            }
            Some(DisplayEvent::VsyncInterrupt) | Some(DisplayEvent::HsyncInterrupt) => {
                // Single-plane interrupts carry one flip id, multi-plane
                // ones a batch.
                if let Ok(flip_ids) = record.u64_array("flip_ids") {
                    let flip_ids = flip_ids.to_vec();
                    for flip_id in flip_ids {
                        self.display_sync_interrupt(record, (flip_id >> 32) as u32);
                    }
                } else {
                    let Some(flip_id) = field(record, record.u64("flip_id")) else {
                        return;
                    };
                    self.display_sync_interrupt(record, (flip_id >> 32) as u32);
                }
            }
            Some(DisplayEvent::KernelPresent) => {
                let Some(window) = field(record, record.u64("window")) else {
                    return;
                };
                self.display_kernel_present(record, window);
            }
            Some(DisplayEvent::PresentHistory) | Some(DisplayEvent::PresentHistoryDetailed) => {
                let Some(token) = field(record, record.u64("token")) else {
                    return;
                };
                let Some(model) = field(record, record.u32("model")) else {
                    return;
                };
                let Some(token_data) = field(record, record.u64("token_data")) else {
                    return;
                };
                let model = HistoryModel::from_u32(model).unwrap_or(HistoryModel::Unknown);
                self.display_present_history(record, token, model, token_data);
            }
            Some(DisplayEvent::PresentHistoryRetired) => {
                let Some(token) = field(record, record.u64("token")) else {
                    return;
                };
                self.display_present_history_retired(record, token);
            }
            Some(DisplayEvent::Blit) => {
                let Some(window) = field(record, record.u64("window")) else {
                    return;
                };
                let Some(redirected) = field(record, record.u32("redirected")) else {
                    return;
                };
                self.display_blit(record, window, redirected != 0);
            }
            Some(DisplayEvent::BlitCancel) => self.display_blit_cancel(record),

            Some(DisplayEvent::DeviceStart) | Some(DisplayEvent::DeviceSnapshot) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(adapter) = field(record, record.u64("adapter")) else {
                    return;
                };
                let Some(device) = field(record, record.u64("device")) else {
                    return;
                };
                self.gpu.device_start(adapter, device);
            }
            Some(DisplayEvent::DeviceStop) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(device) = field(record, record.u64("device")) else {
                    return;
                };
                self.gpu.device_stop(device);
            }
            Some(DisplayEvent::ContextStart) | Some(DisplayEvent::ContextSnapshot) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(context) = field(record, record.u64("context")) else {
                    return;
                };
                let Some(device) = field(record, record.u64("device")) else {
                    return;
                };
                let Some(node) = field(record, record.u32("node")) else {
                    return;
                };
                // Snapshot rundowns describe pre-existing contexts whose
                // owning process is not the event's emitter.
                let create_accounting =
                    DisplayEvent::from_id(record.event_id) == Some(DisplayEvent::ContextStart);
                self.gpu.context_start(
                    context,
                    device,
                    node,
                    record.process_id,
                    create_accounting,
                );
            }
            Some(DisplayEvent::ContextStop) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(context) = field(record, record.u64("context")) else {
                    return;
                };
                self.gpu.context_stop(context);
            }
            Some(DisplayEvent::EngineMetadata) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(adapter) = field(record, record.u64("adapter")) else {
                    return;
                };
                let Some(node) = field(record, record.u32("node")) else {
                    return;
                };
                let Some(class) = field(record, record.u32("class")) else {
                    return;
                };
                let class = EngineClass::from_u32(class).unwrap_or(EngineClass::Other);
                self.gpu.engine_metadata(adapter, node, class);
            }
            Some(DisplayEvent::DmaPacketStart) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(context) = field(record, record.u64("context")) else {
                    return;
                };
                let Some(sequence) = field(record, record.u32("sequence")) else {
                    return;
                };
                self.gpu.dma_start(context, sequence, record.timestamp);
            }
            Some(DisplayEvent::DmaPacketComplete) => {
                if !self.settings.track_gpu {
                    return;
                }
                let Some(context) = field(record, record.u64("context")) else {
                    return;
                };
                let Some(sequence) = field(record, record.u32("sequence")) else {
                    return;
                };
                self.display_dma_complete(record, context, sequence);
            }
            None => {}
        }
    }

    fn route_window(&mut self, record: &EventRecord) {
        match WindowEvent::from_id(record.event_id) {
            Some(WindowEvent::TokenIssued) => {
                let Some(key) = self.decode_surface_token(record) else {
                    return;
                };
                // Destination dimensions were added in version 1.
                let dest = if record.version >= 1 {
                    let Some(width) = field(record, record.u32("dest_width")) else {
                        return;
                    };
                    let Some(height) = field(record, record.u32("dest_height")) else {
                        return;
                    };
                    Some((width, height))
                } else {
                    None
                };
                self.window_token_issued(record, key, dest);
            }
            Some(WindowEvent::TokenStateChanged) => {
                let Some(key) = self.decode_surface_token(record) else {
                    return;
                };
                let Some(state) = field(record, record.u32("state")) else {
                    return;
                };
                let Some(state) = TokenState::from_u32(state) else {
                    return;
                };
                let independent_flip = state == TokenState::InFrame
                    && record.u32("independent_flip").map(|v| v != 0).unwrap_or(false);
                self.window_token_state_changed(record, key, state, independent_flip);
            }
            Some(WindowEvent::InputDeviceRead) => self.window_input_read(record),
            None => {}
        }
    }

    fn route_compositor(&mut self, record: &EventRecord) {
        match CompositorEvent::from_id(record.event_id) {
            Some(CompositorEvent::PresentHistoryNotify) => self.compositor_history_fetched(record),
            Some(CompositorEvent::SchedulePresent) => self.compositor_schedule_present(record),
            Some(CompositorEvent::FlipChainPending)
            | Some(CompositorEvent::FlipChainComplete)
            | Some(CompositorEvent::FlipChainDirty) => {
                let Some(chain_id) = field(record, record.u32("chain_id")) else {
                    return;
                };
                let Some(serial) = field(record, record.u32("serial")) else {
                    return;
                };
                let Some(window) = field(record, record.u64("window")) else {
                    return;
                };
                self.compositor_flip_chain(record, chain_id, serial, window);
            }
            Some(CompositorEvent::SurfaceUpdateScheduled) => {
                let Some(key) = self.decode_surface_token(record) else {
                    return;
                };
                self.compositor_surface_update(record, key);
            }
            None => {}
        }
    }

    fn route_process(&mut self, record: &EventRecord) {
        let Some(event) = ProcessEvent::from_id(record.event_id) else {
            return;
        };
        let Some(process_id) = field(record, record.u32("process_id")) else {
            return;
        };
        let Some(image_name) = field(record, record.str("image_name")) else {
            return;
        };
        let image_name = image_name.to_string();
        self.process_changed(
            record,
            process_id,
            &image_name,
            event == ProcessEvent::Started,
        );
    }

    fn route_pacer(&mut self, record: &EventRecord) {
        let Some(event) = PacerEvent::from_id(record.event_id) else {
            return;
        };
        let Some(swapchain) = field(record, record.u64("swapchain")) else {
            return;
        };
        match event {
            PacerEvent::SessionStart => self.pacer_session_start(record, swapchain),
            PacerEvent::SessionStop => self.pacer_session_stop(record, swapchain),
            PacerEvent::FrameComplete => {
                let Some(scheduled_time) = field(record, record.u64("scheduled_time")) else {
                    return;
                };
                let Some(flip_time) = field(record, record.u64("flip_time")) else {
                    return;
                };
                self.pacer_frame_complete(record, swapchain, scheduled_time, flip_time);
            }
        }
    }

    fn decode_surface_token(&self, record: &EventRecord) -> Option<SurfaceToken> {
        let surface = field(record, record.u64("surface"))?;
        let present_count = field(record, record.u64("present_count"))?;
        let bind_id = field(record, record.u64("bind_id"))?;
        Some(SurfaceToken { surface, present_count, bind_id })
    }
}
