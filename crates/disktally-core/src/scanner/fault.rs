/// Single-slot fault mailbox between the worker and a polling caller.
///
/// The worker posts; the caller drains with `take`. Posting over an
/// undrained fault replaces it, so at most one fault is surfaced per polling
/// interval.
use crate::error::ScanError;
use parking_lot::Mutex;
use tracing::warn;

#[derive(Debug, Default)]
pub struct FaultMailbox {
    slot: Mutex<Option<ScanError>>,
}

impl FaultMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, fault: ScanError) {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.as_ref() {
            warn!("Replacing undrained scan fault: {previous}");
        }
        *slot = Some(fault);
    }

    pub fn take(&self) -> Option<ScanError> {
        self.slot.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn take_drains_the_slot() {
        let mailbox = FaultMailbox::new();
        assert!(mailbox.take().is_none());
        mailbox.post(ScanError::WorkerPanicked {
            message: "boom".into(),
        });
        assert!(matches!(mailbox.take(), Some(ScanError::WorkerPanicked { .. })));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn second_post_overwrites_first() {
        let mailbox = FaultMailbox::new();
        mailbox.post(ScanError::WorkerPanicked {
            message: "first".into(),
        });
        mailbox.post(ScanError::NotADirectory {
            path: PathBuf::from("/second"),
        });
        assert!(matches!(mailbox.take(), Some(ScanError::NotADirectory { .. })));
        assert!(mailbox.take().is_none());
    }
}
