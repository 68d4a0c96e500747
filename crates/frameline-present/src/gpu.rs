//! GPU work attribution.
//!
//! Tracks per-(adapter, engine) packet queues and accumulates DMA execution
//! wall-clock per process, split into video and non-video engine classes. The
//! accumulated time is transferred onto a present exactly once, when that
//! present reaches a point that needs GPU timing, then reset.
//!
//! Capture loss is tolerated with bounded error: a completion for a sequence
//! older than the queue head is ignored (its start was missed), and a
//! completion newer than the head collapses the intervening start-only
//! entries onto the match.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use crate::present::Present;
use frameline_trace::EngineClass;

/// In-flight packets tracked per engine queue. Overflow packets are ignored;
/// this matches the small fixed window the driver keeps per node.
const NODE_QUEUE_LEN: usize = 8;

/// Image names treated as cloud-streaming capture processes. Video-decode
/// work drained by such a process is re-surfaced as synthetic presents.
const CLOUD_STREAMING_PROCESSES: &[&str] = &[
    "cloudstreamd.exe",
    "cloud-screen-capture.exe",
    "duplication-encode-sample.exe",
];

/// Mutex-guarded process-name table shared with the process-event handler.
pub type ProcessNames = Arc<Mutex<HashMap<u32, String>>>;

/// A drained video-encode packet belonging to the cloud-streaming process;
/// the lifecycle engine turns it into a synthetic, already-complete present.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CloudEncodeFrame {
    pub process_id: u32,
}

#[derive(Copy, Clone, Debug, Default)]
struct EngineAccum {
    accumulated: u64,
    exec_start: u64,
    exec_count: u32,
}

#[derive(Copy, Clone, Debug, Default)]
struct DmaAccounting {
    video: EngineAccum,
    other: EngineAccum,
}

#[derive(Debug)]
struct Node {
    sequence: [u32; NODE_QUEUE_LEN],
    process: [u32; NODE_QUEUE_LEN],
    head: usize,
    count: usize,
    is_video: bool,
    is_video_decode: bool,
}

impl Node {
    fn new() -> Self {
        Self {
            sequence: [0; NODE_QUEUE_LEN],
            process: [0; NODE_QUEUE_LEN],
            head: 0,
            count: 0,
            is_video: false,
            is_video_decode: false,
        }
    }
}

#[derive(Debug)]
struct ContextInfo {
    node_key: (u64, u32),
    process_id: u32,
    has_accounting: bool,
    cloud_encoder: bool,
}

#[derive(Debug)]
pub struct GpuAttribution {
    /// device -> adapter, so context-start events can reach their node.
    devices: HashMap<u64, u64>,
    contexts: HashMap<u64, ContextInfo>,
    nodes: HashMap<(u64, u32), Node>,
    accounting: HashMap<u32, DmaAccounting>,
    process_names: ProcessNames,
    cloud_streaming_pid: u32,
}

impl GpuAttribution {
    pub fn new(process_names: ProcessNames) -> Self {
        Self {
            devices: HashMap::new(),
            contexts: HashMap::new(),
            nodes: HashMap::new(),
            accounting: HashMap::new(),
            process_names,
            cloud_streaming_pid: 0,
        }
    }

    pub fn device_start(&mut self, adapter: u64, device: u64) {
        // Duplicate starts happen; last one wins.
        self.devices.insert(device, adapter);
    }

    pub fn device_stop(&mut self, device: u64) {
        self.devices.remove(&device);
    }

    /// Registers a driver context on its engine node. `create_accounting` is
    /// false for snapshot rundowns of pre-existing contexts, whose owning
    /// process is only learned from the first packet submitted on them.
    pub fn context_start(
        &mut self,
        context: u64,
        device: u64,
        node_ordinal: u32,
        process_id: u32,
        create_accounting: bool,
    ) {
        let Some(&adapter) = self.devices.get(&device) else {
            tracing::debug!(device, "context start for unknown device");
            return;
        };
        let node_key = (adapter, node_ordinal);
        self.nodes.entry(node_key).or_insert_with(Node::new);
        self.contexts.insert(
            context,
            ContextInfo { node_key, process_id, has_accounting: false, cloud_encoder: false },
        );
        if create_accounting {
            self.ensure_context_accounting(context, process_id);
        }
    }

    pub fn context_stop(&mut self, context: u64) {
        self.contexts.remove(&context);
    }

    pub fn engine_metadata(&mut self, adapter: u64, node_ordinal: u32, class: EngineClass) {
        // The node is normally created by a preceding context start, but the
        // metadata event can win the race.
        let node = self.nodes.entry((adapter, node_ordinal)).or_insert_with(Node::new);
        node.is_video = class.is_video();
        node.is_video_decode = class == EngineClass::VideoDecode;
    }

    /// Creates the per-process accounting for a context if it does not have
    /// one yet (contexts created before capture start get theirs from the
    /// first queue submission referencing them).
    pub fn ensure_context_accounting(&mut self, context: u64, process_id: u32) {
        let Some(ctx) = self.contexts.get_mut(&context) else {
            return;
        };
        if ctx.has_accounting {
            return;
        }
        ctx.has_accounting = true;
        ctx.process_id = process_id;

        let newly_created = !self.accounting.contains_key(&process_id);
        self.accounting.entry(process_id).or_default();

        if newly_created && self.cloud_streaming_pid == 0 {
            let names = match self.process_names.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(name) = names.get(&process_id) {
                if CLOUD_STREAMING_PROCESSES
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(name))
                {
                    self.cloud_streaming_pid = process_id;
                }
            }
        }

        let is_video_decode = self
            .nodes
            .get(&ctx.node_key)
            .map(|node| node.is_video_decode)
            .unwrap_or(false);
        if is_video_decode && process_id == self.cloud_streaming_pid {
            ctx.cloud_encoder = true;
        }
    }

    /// A packet was enqueued onto its context's engine node.
    pub fn dma_start(&mut self, context: u64, sequence: u32, timestamp: u64) {
        // Sequence zero marks preemption/notification packets with no GPU
        // work attached.
        if sequence == 0 {
            return;
        }
        let Some(ctx) = self.contexts.get(&context) else {
            return;
        };
        // A context created pre-capture without an accounting yet: skip the
        // packet so node and accounting state cannot drift apart.
        if !ctx.has_accounting {
            return;
        }
        let process_id = ctx.process_id;
        let Some(node) = self.nodes.get_mut(&ctx.node_key) else {
            return;
        };
        if node.count == NODE_QUEUE_LEN {
            // Queue window exhausted (missing completion interrupts, seen
            // when an application exits mid-frame). Drop the packet.
            return;
        }

        let index = (node.head + node.count) % NODE_QUEUE_LEN;
        node.sequence[index] = sequence;
        node.process[index] = process_id;
        node.count += 1;

        // An empty queue means this packet starts executing right away.
        if node.count == 1 {
            let is_video = node.is_video;
            let accum = self.class_accum(process_id, is_video);
            accum.exec_count += 1;
            if accum.exec_count == 1 {
                accum.exec_start = timestamp;
            }
        }
    }

    /// A packet-completion interrupt fired. Returns a [`CloudEncodeFrame`]
    /// when the drained packet belongs to the cloud-streaming encoder.
    pub fn dma_complete(
        &mut self,
        context: u64,
        sequence: u32,
        timestamp: u64,
    ) -> Option<CloudEncodeFrame> {
        if sequence == 0 {
            return None;
        }
        let Some(ctx) = self.contexts.get(&context) else {
            return None;
        };
        if !ctx.has_accounting {
            return None;
        }
        let node_key = ctx.node_key;
        let cloud_encoder = ctx.cloud_encoder;
        let node = self.nodes.get_mut(&node_key)?;
        if node.count == 0 || sequence < node.sequence[node.head] {
            // Missed this packet's start event; some idle time will be
            // misattributed to the previous packet. Bounded error, accepted.
            return None;
        }

        if sequence > node.sequence[node.head] {
            // Missed one or more completion interrupts. Search forward for
            // the match and collapse the start-only entries onto it, carrying
            // the head's process (we cannot know when the missed packets
            // actually ended).
            let mut missing = 1;
            loop {
                if missing == node.count {
                    return None;
                }
                let index = (node.head + missing) % NODE_QUEUE_LEN;
                if node.sequence[index] == sequence {
                    node.sequence[index] = node.sequence[node.head];
                    node.process[index] = node.process[node.head];
                    node.head = index;
                    node.count -= missing;
                    break;
                }
                missing += 1;
            }
        }

        let process_id = node.process[node.head];
        let is_video = node.is_video;
        node.count -= 1;
        let more_queued = node.count > 0;
        if more_queued {
            node.head = (node.head + 1) % NODE_QUEUE_LEN;
        }
        let next_process = if more_queued { node.process[node.head] } else { 0 };

        {
            let accum = self.class_accum(process_id, is_video);
            accum.exec_count = accum.exec_count.saturating_sub(1);
            // The process's last executing packet on this class: bank the
            // interval.
            if accum.exec_count == 0 {
                accum.accumulated += timestamp.saturating_sub(accum.exec_start);
            }
        }

        if more_queued {
            let accum = self.class_accum(next_process, is_video);
            accum.exec_count += 1;
            if accum.exec_count == 1 {
                accum.exec_start = timestamp;
            }
        }

        if cloud_encoder {
            Some(CloudEncodeFrame { process_id: self.cloud_streaming_pid })
        } else {
            None
        }
    }

    /// Transfers the accumulated DMA time for `process_id` onto `present`,
    /// closing out any still-executing intervals at `timestamp`, then resets
    /// the accumulators so each unit of GPU time lands on exactly one
    /// present.
    pub fn assign_accumulated(&mut self, process_id: u32, timestamp: u64, present: &mut Present) {
        let Some(accounting) = self.accounting.get_mut(&process_id) else {
            return;
        };
        for accum in [&mut accounting.video, &mut accounting.other] {
            if accum.exec_count > 0 {
                accum.accumulated += timestamp.saturating_sub(accum.exec_start);
                accum.exec_start = timestamp;
            }
        }
        present.gpu_duration = accounting.other.accumulated;
        present.gpu_video_duration = accounting.video.accumulated;
        accounting.other.accumulated = 0;
        accounting.video.accumulated = 0;
    }

    fn class_accum(&mut self, process_id: u32, is_video: bool) -> &mut EngineAccum {
        let accounting = self.accounting.entry(process_id).or_default();
        if is_video {
            &mut accounting.video
        } else {
            &mut accounting.other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::{Present, Runtime};

    fn attribution() -> GpuAttribution {
        GpuAttribution::new(Arc::new(Mutex::new(HashMap::new())))
    }

    fn setup_context(gpu: &mut GpuAttribution, context: u64, pid: u32) {
        gpu.device_start(0xad, 0xde);
        gpu.context_start(context, 0xde, 0, pid, true);
    }

    fn present() -> Present {
        Present::new(1, 2, 0, Runtime::Modern)
    }

    #[test]
    fn serial_packets_accumulate_execution_time() {
        let mut gpu = attribution();
        setup_context(&mut gpu, 0xc0, 1);

        gpu.dma_start(0xc0, 1, 100);
        assert_eq!(gpu.dma_complete(0xc0, 1, 150), None);
        gpu.dma_start(0xc0, 2, 200);
        gpu.dma_complete(0xc0, 2, 260);

        let mut p = present();
        gpu.assign_accumulated(1, 300, &mut p);
        assert_eq!(p.gpu_duration, 50 + 60);
        assert_eq!(p.gpu_video_duration, 0);

        // Assignment resets the accumulator.
        let mut p2 = present();
        gpu.assign_accumulated(1, 400, &mut p2);
        assert_eq!(p2.gpu_duration, 0);
    }

    #[test]
    fn queued_packets_attribute_from_previous_completion() {
        let mut gpu = attribution();
        setup_context(&mut gpu, 0xc0, 1);

        gpu.dma_start(0xc0, 1, 100);
        gpu.dma_start(0xc0, 2, 110); // queued behind packet 1
        gpu.dma_complete(0xc0, 1, 150);
        gpu.dma_complete(0xc0, 2, 190);

        let mut p = present();
        gpu.assign_accumulated(1, 200, &mut p);
        // Packet 1 ran 100..150, packet 2 ran 150..190.
        assert_eq!(p.gpu_duration, 90);
    }

    #[test]
    fn completion_older_than_head_is_ignored() {
        let mut gpu = attribution();
        setup_context(&mut gpu, 0xc0, 1);

        gpu.dma_start(0xc0, 5, 100);
        // Start for packet 3 was missed before capture; its completion must
        // not disturb the queue.
        assert_eq!(gpu.dma_complete(0xc0, 3, 120), None);
        gpu.dma_complete(0xc0, 5, 150);

        let mut p = present();
        gpu.assign_accumulated(1, 160, &mut p);
        assert_eq!(p.gpu_duration, 50);
    }

    #[test]
    fn completion_newer_than_head_collapses_missed_entries() {
        let mut gpu = attribution();
        setup_context(&mut gpu, 0xc0, 1);

        gpu.dma_start(0xc0, 5, 100);
        gpu.dma_start(0xc0, 6, 105);
        gpu.dma_start(0xc0, 7, 110);
        // Completions for 5 and 6 were missed; 7's interrupt collapses them.
        gpu.dma_complete(0xc0, 7, 180);

        let mut p = present();
        gpu.assign_accumulated(1, 200, &mut p);
        assert_eq!(p.gpu_duration, 80, "head packet carries the whole interval");

        // The queue is empty again: a fresh packet behaves normally.
        gpu.dma_start(0xc0, 8, 300);
        gpu.dma_complete(0xc0, 8, 320);
        let mut p2 = present();
        gpu.assign_accumulated(1, 330, &mut p2);
        assert_eq!(p2.gpu_duration, 20);
    }

    #[test]
    fn completion_with_no_match_in_queue_is_ignored() {
        let mut gpu = attribution();
        setup_context(&mut gpu, 0xc0, 1);
        gpu.dma_start(0xc0, 5, 100);
        assert_eq!(gpu.dma_complete(0xc0, 9, 150), None);
        // Packet 5 still completes normally afterwards.
        gpu.dma_complete(0xc0, 5, 170);
        let mut p = present();
        gpu.assign_accumulated(1, 180, &mut p);
        assert_eq!(p.gpu_duration, 70);
    }

    #[test]
    fn video_engine_time_is_tracked_separately() {
        let mut gpu = attribution();
        gpu.device_start(0xad, 0xde);
        gpu.engine_metadata(0xad, 1, EngineClass::VideoDecode);
        gpu.context_start(0xc0, 0xde, 0, 1, true);
        gpu.context_start(0xc1, 0xde, 1, 1, true);

        gpu.dma_start(0xc0, 1, 100);
        gpu.dma_complete(0xc0, 1, 130);
        gpu.dma_start(0xc1, 1, 100);
        gpu.dma_complete(0xc1, 1, 160);

        let mut p = present();
        gpu.assign_accumulated(1, 200, &mut p);
        assert_eq!(p.gpu_duration, 30);
        assert_eq!(p.gpu_video_duration, 60);
    }

    #[test]
    fn cloud_streaming_decode_contexts_surface_encode_frames() {
        let names: ProcessNames = Arc::new(Mutex::new(HashMap::new()));
        names.lock().unwrap().insert(77, "cloudstreamd.exe".to_string());
        let mut gpu = GpuAttribution::new(names);

        gpu.device_start(0xad, 0xde);
        gpu.engine_metadata(0xad, 0, EngineClass::VideoDecode);
        gpu.context_start(0xc0, 0xde, 0, 77, true);
        assert_eq!(gpu.cloud_streaming_pid, 77);

        gpu.dma_start(0xc0, 1, 100);
        assert_eq!(gpu.dma_complete(0xc0, 1, 150), Some(CloudEncodeFrame { process_id: 77 }));
    }

    #[test]
    fn snapshot_context_gets_accounting_from_first_submission() {
        let mut gpu = attribution();
        gpu.device_start(0xad, 0xde);
        gpu.context_start(0xc0, 0xde, 0, 0, false);

        // Packets before the owning process is known are skipped.
        gpu.dma_start(0xc0, 1, 100);
        assert_eq!(gpu.dma_complete(0xc0, 1, 150), None);

        gpu.ensure_context_accounting(0xc0, 42);
        gpu.dma_start(0xc0, 2, 200);
        gpu.dma_complete(0xc0, 2, 230);
        let mut p = present();
        gpu.assign_accumulated(42, 240, &mut p);
        assert_eq!(p.gpu_duration, 30);
    }
}
