use crate::JobError;

/// Settled result of one job, as recorded by the queue and delivered to
/// subscribers.
#[derive(Debug)]
pub struct JobOutcome<T, Tag = ()> {
    /// Position in completion order, starting at 0 after each reset
    pub index: usize,
    pub result: Result<T, JobError>,
    pub tag: Option<Tag>,
}

impl<T, Tag> JobOutcome<T, Tag> {
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&JobError> {
        self.result.as_ref().err()
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
