// History: the append-only audit log and lazy queries over it.

pub mod query;
pub mod recorder;

pub use query::HistoryQuery;
pub use recorder::{HistoryRecorder, RetryPolicy};
