pub mod allocate;
pub mod cache;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod progress;
pub mod render;
pub mod types;

pub use engine::{Optimizer, Outcome};
pub use error::{Error, Result};
