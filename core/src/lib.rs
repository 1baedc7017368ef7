//! Discrete-event simulation of a hospital emergency service.
//!
//! One tick is one simulated minute. `HospitalEngine` advances a single
//! run; `TrajectoryGenerator` runs many in parallel and aggregates them.

pub mod analysis;
pub mod arrival;
pub mod clock;
pub mod config;
pub mod disease;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod event;
pub mod incident;
pub mod rng;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod store;
pub mod trajectory;
pub mod treatment;
pub mod types;
pub mod variation;
