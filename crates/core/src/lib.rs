//! Domain types and pure logic for the AIEGO generation worker.
//!
//! Turns caller input into a validated [`request::GenerationRequest`] and
//! translates it into a ComfyUI [`graph::ComputationGraph`] via
//! [`workflow::build_graph`]. Nothing in this crate performs I/O.

pub mod error;
pub mod graph;
pub mod request;
pub mod workflow;
