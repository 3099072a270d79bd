use crate::stored_object;

/// Lease state of a queued `Job` row. The default `Queue` adapter polls for
/// `Ready` rows and atomically flips one to `Claimed` to hand it to a
/// worker; `blocking_pop`'s bounded timeout is what lets the poll loop also
/// observe shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Ready,
    Claimed,
    Done,
}

/// All other ingestion state is looked up from `MetaStore` by `doc_id`; the
/// job row itself carries nothing else.
stored_object!(Job, "job", {
    doc_id: String,
    state: JobState
});

impl Job {
    pub fn new(doc_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            doc_id: doc_id.into(),
            state: JobState::Ready,
        }
    }
}
