//! Core of the hostpulse agent.
//!
//! Metric snapshots flow from the [`producer`] through [`ingest`] into the
//! bounded [`queue`], where the [`scheduler`] decides when they are posted.
//! Health checks run in [`checker`] tasks and are batched by the
//! [`aggregator`]. [`termination`] ties the tasks together for an orderly
//! shutdown, and [`agent::Agent`] wires everything up for a host resolved
//! by [`registration`].

pub mod agent;
pub mod aggregator;
pub mod checker;
pub mod config;
pub mod delay;
pub mod error;
pub mod ingest;
pub mod producer;
pub mod queue;
pub mod registration;
pub mod scheduler;
pub mod spec_refresh;
pub mod termination;
