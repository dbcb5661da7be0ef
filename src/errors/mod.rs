//! Error types for checkpoint loading, model integrity and inference.

mod load_error;
mod model_error;

pub use load_error::LoadError;
pub use model_error::{IntegrityError, ModelError};
