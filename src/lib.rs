//! Download, verify, extract and import browser-testing VM images.
//!
//! The [`pipeline`] module is the core: it takes a resolved
//! [`catalog::ImageDescriptor`] and a download directory, and drives the
//! archive through checksum verification, extraction and a hypervisor
//! import via [`backends`]. The [`catalog`] and [`helpers`] modules only
//! feed it its inputs.

pub mod backends;
pub mod catalog;
pub mod helpers;
pub mod pipeline;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use pipeline::{InstallReport, Pipeline, PipelineError, Stage, StageFailure};
