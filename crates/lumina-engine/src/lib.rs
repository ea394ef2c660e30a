pub mod client;
pub mod error;
pub mod generator;
pub mod media;
pub mod wire;

pub use client::{ClientFactory, GenAiClient, HttpClientFactory, StudioClient, VertexClient};
pub use error::GenerationError;
pub use generator::{BatchOutcome, ImageGenerator, IterationFailure};
