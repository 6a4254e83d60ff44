//! URL shortener service implementation.
//!
//! [`ShortenerService`] implements [`Shortener`][tinylink_core::Shortener] on
//! top of any [`Storage`][tinylink_core::Storage] backend. Deletions are
//! handed to a [`DeletionPipeline`] and applied in the background.

pub mod pipeline;
pub mod service;

pub use pipeline::{
    fan_in, fan_out, DeletionAck, DeletionPipeline, DeletionReport, PipelineSettings,
};
pub use service::{ServiceSettings, ShortenerService};
