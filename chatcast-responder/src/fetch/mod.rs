//! Answer fetching: request, chunk planning, audio download, validation

pub mod audio;
pub mod markup;
pub mod task;

pub use audio::{fetch_chunks, AudioFetcher, HttpAudioFetcher};
pub use markup::{parse_markup, plan_chunks, resolve_voice_url, AnswerMarkup, ChunkPlan, PlannedAudio, PlannedChunk};
pub use task::{AnswerFetchTask, TaskDeps, TaskOutcome, TaskState};
