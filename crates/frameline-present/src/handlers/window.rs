//! Window-session composition tokens. Every composed present gets a token
//! whose state transitions mirror the compositor's decisions about the
//! frame: picked up, submitted, shown, or dropped.

use frameline_trace::{EventRecord, TokenState, PRESENT_FLAG_DO_NOT_SEQUENCE};

use crate::present::{PresentMode, PresentResult, SurfaceToken};
use crate::tracker::PresentTracker;

impl PresentTracker {
    pub(crate) fn window_token_issued(
        &mut self,
        record: &EventRecord,
        key: SurfaceToken,
        dest: Option<(u32, u32)>,
    ) {
        // A present that has already been through token issuance is stuck.
        let Some(mut slot) = self.find_or_create_present(
            record.process_id,
            record.thread_id,
            record.timestamp,
        ) else {
            return;
        };
        loop {
            let contradicted = self
                .registry
                .get(slot)
                .map_or(false, |p| p.seen_window_token);
            if !contradicted {
                break;
            }
            self.evict_as_lost(slot);
            let Some(fresh) = self.find_or_create_present(
                record.process_id,
                record.thread_id,
                record.timestamp,
            ) else {
                return;
            };
            slot = fresh;
        }

        let input_time = if self.settings.track_input {
            self.last_input_read.take()
        } else {
            None
        };
        let Some(present) = self.registry.get_mut(slot) else {
            return;
        };
        present.mode = PresentMode::ComposedFlip;
        present.seen_window_token = true;
        if let Some((width, height)) = dest {
            present.dest_width = width;
            present.dest_height = height;
        }
        if input_time.is_some() {
            // The most recent input read is charged to the next frame the
            // compositor sees.
            present.input_time = input_time;
        }
        present.surface_token = Some(key);
        self.indices.set_surface_token(key, slot);
    }

    pub(crate) fn window_token_state_changed(
        &mut self,
        record: &EventRecord,
        key: SurfaceToken,
        state: TokenState,
        independent_flip: bool,
    ) {
        let Some(slot) = self.indices.surface_token(key) else {
            return;
        };
        match state {
            // Composition of this frame is starting.
            TokenState::InFrame => {
                let window = self
                    .registry
                    .get(slot)
                    .map_or(0, |present| present.window);
                if window != 0 {
                    // Composing a newer present means the previous one for
                    // this window was dropped; there may never be an
                    // explicit Discarded transition for it.
                    match self.indices.window_latest(window) {
                        None => self.indices.set_window_latest(window, slot),
                        Some(previous) if previous != slot => {
                            if let Some(p) = self.registry.get_mut(previous) {
                                p.result = PresentResult::Discarded;
                            }
                            self.indices.set_window_latest(window, slot);
                        }
                        Some(_) => {}
                    }
                }
                if independent_flip {
                    if let Some(present) = self.registry.get_mut(slot) {
                        if present.mode == PresentMode::ComposedFlip {
                            present.mode = PresentMode::HardwareIndependentFlip;
                        }
                    }
                }
            }

            // The frame was submitted for display.
            TokenState::Confirmed => {
                let Some(present) = self.registry.get_mut(slot) else {
                    return;
                };
                // A do-not-sequence present can be confirmed if a frame was
                // composed while its token completed, but it never shows.
                if present.result == PresentResult::Unknown
                    && present.flags & PRESENT_FLAG_DO_NOT_SEQUENCE != 0
                {
                    present.result = PresentResult::Discarded;
                }
                let window = present.window;
                if window != 0 {
                    self.indices.clear_window_latest(window);
                }
            }

            // The frame was replaced on screen by a newer one.
            TokenState::Retired => {
                let Some(present) = self.registry.get_mut(slot) else {
                    return;
                };
                if present.result == PresentResult::Unknown {
                    present.screen_time = record.timestamp;
                    present.result = PresentResult::Presented;
                }
            }

            // Terminal: the compositor released the token.
            TokenState::Discarded => {
                self.indices.clear_surface_token(key);
                let Some(present) = self.registry.get_mut(slot) else {
                    return;
                };
                if present.result == PresentResult::Unknown || present.screen_time == 0 {
                    present.result = PresentResult::Discarded;
                }
                self.complete_present(slot);
            }
        }
    }

    pub(crate) fn window_input_read(&mut self, record: &EventRecord) {
        if self.settings.track_input {
            self.last_input_read = Some(record.timestamp);
        }
    }
}
