//! Domain models for generation-service.

mod generation;
mod user;

pub use generation::{
    Generation, GenerationStatus, NewGeneration, GENERATION_CHARGE, MODEL_LABEL,
};
pub use user::UserBalance;
