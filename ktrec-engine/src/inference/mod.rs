//! Glue between protocol requests and the numeric core.

pub mod evaluation;
pub mod recommendation;

pub use evaluation::run_evaluation;
pub use recommendation::run_recommendation;
