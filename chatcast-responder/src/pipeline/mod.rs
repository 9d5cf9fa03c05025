//! Two-stage comment pipeline: ordered answer fetching feeding ordered playback

pub mod admission;
pub mod controller;
pub mod request_queue;
pub mod scoped_queue;

pub use admission::{Admission, AdmissionFilter};
pub use controller::{CancelSummary, PipelineController, PipelineParts, PipelineStatus, SubmitOutcome};
pub use request_queue::RequestQueue;
pub use scoped_queue::{PushError, ScopedQueue};
