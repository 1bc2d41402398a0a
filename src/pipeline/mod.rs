//! Pipeline entry points.
//!
//! - `PushPipeline`: poll a window, filter titles, cache representative images
//! - `run_push`: the same over a window ending now, for the CLI

pub mod push;

pub use push::{PushOutcome, PushPipeline, SkipStage, SkippedTitle, run_push};
