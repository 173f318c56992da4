//! Frame transforms
//!
//! - [`TransformCatalog`]: named transforms registered at startup
//! - [`TransformStage`]: per-track pull loop applying the selected transform
//! - [`StageControl`]: selection and channel binding of a running stage

pub mod catalog;
pub mod stage;

pub use catalog::{FrameTransform, Passthrough, Transform, TransformCatalog, TransformInfo, TransformOutput, PASSTHROUGH};
pub use stage::{StageControl, TransformStage};
