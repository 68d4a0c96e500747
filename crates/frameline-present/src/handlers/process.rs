//! Process start/stop events keep the session-scoped image-name table
//! current and surface the updates to the consumer.

use frameline_trace::EventRecord;

use crate::delivery::ProcessUpdate;
use crate::tracker::PresentTracker;

impl PresentTracker {
    pub(crate) fn process_changed(
        &mut self,
        record: &EventRecord,
        process_id: u32,
        image_name: &str,
        started: bool,
    ) {
        {
            let mut names = match self.process_names.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if started {
                names.insert(process_id, image_name.to_string());
            } else {
                names.remove(&process_id);
            }
        }
        self.delivery.processes.push(ProcessUpdate {
            timestamp: record.timestamp,
            process_id,
            image_name: image_name.to_string(),
            started,
        });
    }
}
