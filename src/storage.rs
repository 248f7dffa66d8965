//! Storage-access interface passed into the pipeline.
//!
//! The pipeline never opens connections itself: callers hand it a source of
//! runs/streams and a sink for labels, scoped to one invocation.
//! [`crate::SqliteStore`] implements both.

use crate::error::Result;
use crate::{Classification, RunSummary, StreamSample};

/// Read side: current runs and their streams.
pub trait RunSource {
    /// Every run in the current batch.
    fn load_runs(&self) -> Result<Vec<RunSummary>>;

    /// Stream samples for the given activities, ordered by activity then time.
    fn load_streams(&self, activity_ids: &[i64]) -> Result<Vec<StreamSample>>;
}

/// Write side: persisted activity → run type mapping.
pub trait ClassificationSink {
    /// Insert or overwrite one label per activity.
    fn upsert_classifications(&mut self, classifications: &[Classification]) -> Result<usize>;
}

impl<T: RunSource + ?Sized> RunSource for &T {
    fn load_runs(&self) -> Result<Vec<RunSummary>> {
        (**self).load_runs()
    }

    fn load_streams(&self, activity_ids: &[i64]) -> Result<Vec<StreamSample>> {
        (**self).load_streams(activity_ids)
    }
}

impl<T: ClassificationSink + ?Sized> ClassificationSink for &mut T {
    fn upsert_classifications(&mut self, classifications: &[Classification]) -> Result<usize> {
        (**self).upsert_classifications(classifications)
    }
}
