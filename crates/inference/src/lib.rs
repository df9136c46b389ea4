//! Relational inference over complex-valued entity embeddings.
//!
//! Entities are complex vectors `real + i*imag` of dimension D and relations
//! are per-dimension rotation angles. Predicting the entity on the far side of
//! a relation is one elementwise complex multiplication; the result is
//! returned in the concatenated `real ++ imag` form used for neighbor search.
//! Storage stays behind the `semantic-index` traits so this crate keeps the
//! numeric logic testable and self-contained.

pub mod complex;
pub mod engine;

pub use complex::{Rotation, modulus};
pub use core_types::InferenceRequest;
pub use engine::{InferenceError, Predictions, RelationalInference};
