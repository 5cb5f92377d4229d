//! Manifest analysis engines.

pub mod kubecuro;
