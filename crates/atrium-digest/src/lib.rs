// The Atrium digest pipeline
//
// Collects discrete portal events (new comment, task created, status change),
// deduplicates and batches them per recipient, and dispatches a single
// periodic email per user. At-most-one delivery per batch under concurrent
// scheduled runs is guaranteed by the atomic claim step in the event queue;
// everything in this crate operates on batches it already owns.

pub mod batch;
pub mod dispatch;
pub mod pipeline;
pub mod recorder;
pub mod render;

pub use batch::{collapse, group_by_recipient};
pub use dispatch::{DigestOutcome, Dispatcher};
pub use pipeline::{DigestConfig, DigestPipeline, RunSummary};
pub use recorder::EventRecorder;
pub use render::{Digest, DigestRenderer};

#[cfg(test)]
mod testing;
