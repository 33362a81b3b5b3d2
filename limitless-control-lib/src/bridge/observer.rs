use log::{debug, error, info};

use super::SessionState;

/// Hooks into the life of a bridge and its groups.
///
/// Every method has an empty default, so implementors only override what
/// they care about. Methods run on the bridge's tasks and must not block.
pub trait Observer: Send + Sync {
    fn state_changed(&self, _bridge: &str, _state: SessionState) {}

    fn frame_sent(&self, _bridge: &str, _frame: &[u8]) {}

    fn stage_started(&self, _group: &str, _stage: &str) {}

    /// `error` carries the message of a failed callback stage.
    fn pipeline_finished(&self, _group: &str, _cancelled: bool, _error: Option<&str>) {}
}

/// Writes every event through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn state_changed(&self, bridge: &str, state: SessionState) {
        info!("Bridge {} is now {}", bridge, state);
    }

    fn frame_sent(&self, bridge: &str, frame: &[u8]) {
        debug!("Sent to {}: {}", bridge, hex::encode(frame));
    }

    fn stage_started(&self, group: &str, stage: &str) {
        debug!("Group {} running stage {}", group, stage);
    }

    fn pipeline_finished(&self, group: &str, cancelled: bool, error: Option<&str>) {
        match error {
            Some(message) => error!("Pipeline on group {} failed: {}", group, message),
            None if cancelled => info!("Pipeline on group {} cancelled", group),
            None => info!("Pipeline on group {} finished", group),
        }
    }
}
