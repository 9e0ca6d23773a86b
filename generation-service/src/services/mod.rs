pub mod generation;
pub mod providers;
pub mod store;

pub use generation::{GenerationRequest, GenerationResult, Generator, DEFAULT_INFERENCE_STEPS};
pub use providers::{ImageProvider, ProviderError};
pub use store::{DebitPolicy, GenerationStore, InMemoryGenerationStore, PgGenerationStore, RecordOutcome};
