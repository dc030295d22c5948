//! Shared test fixtures and utilities for Strider crates.
//!
//! Provides deterministic RNG setup, seeded random matrices for exercising
//! the solver with reproducible Jacobians, and mock stream transports for
//! driving a controller.

pub mod fixtures;
pub mod mocks;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{assert_annihilates, random_matrix, random_vector, scenario_mask};
pub use mocks::{ConstantTransport, RecordingTransport};
pub use rng::seeded_rng;
