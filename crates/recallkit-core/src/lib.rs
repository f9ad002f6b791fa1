//! recallkit-core: recall scoring, trial session state machine, and
//! collaborator traits.
//!
//! This crate defines the data model, the word matcher and scoring engine,
//! score aggregation, the trial-cycle state machine with its session driver,
//! and the traits that concrete collaborators implement.

pub mod aggregate;
pub mod audio;
pub mod distance;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod phonetic;
pub mod report;
pub mod scoring;
pub mod session;
pub mod state;
pub mod traits;
