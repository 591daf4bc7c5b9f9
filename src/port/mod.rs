//! Trait definitions for external collaborators.
//!
//! # Available Ports
//!
//! - [`ResourceFactory`], [`Probe`] - Creation and liveness of pooled handles

mod resource;

pub use resource::{Probe, ResourceFactory};
