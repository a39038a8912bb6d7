//! One generation job from caller input to encoded images.
//!
//! [`orchestrator::Orchestrator`] composes the graph builder from
//! `aiego_core` with the ComfyUI client pieces from `aiego_comfyui`:
//! readiness, submission, completion tracking and artifact collection.
//! Engine settings come from [`config::EngineConfig`]; every failure is a
//! [`error::PipelineError`].

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod response;
