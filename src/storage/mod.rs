//! Persistence of particle state

pub mod snapshot;
