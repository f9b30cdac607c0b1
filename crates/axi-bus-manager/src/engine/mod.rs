//! The two transaction engines: one issue thread plus one response thread
//! each, communicating with their caller through a [`crate::registry::Registry`].

pub mod read;
pub mod write;
