use chrono::{DateTime, Utc};

/// How far the ordered work item list has been consumed
///
/// `cursor_index` is the first position not yet known to be finalized; a
/// resumed run starts there.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub cursor_index: usize,
    pub result_count: u64,
    pub written_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(cursor_index: usize, result_count: u64) -> Self {
        Self {
            cursor_index,
            result_count,
            written_at: Utc::now(),
        }
    }
}
