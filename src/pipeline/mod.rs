// Pipelines that drive the engine over many items at once.

pub mod batch;
