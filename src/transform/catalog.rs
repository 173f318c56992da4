//! Transform catalog
//!
//! Registry of named frame transforms. Filled once at startup, then shared
//! read-only (behind an `Arc`) by every session.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TransformFault;
use crate::media::Frame;

/// Key of the identity transform, always registered
pub const PASSTHROUGH: &str = "passthrough";

/// Result of applying a transform to one frame
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Replacement frame
    pub frame: Frame,
    /// Events detected in the frame, in detection order
    pub events: Vec<String>,
}

impl TransformOutput {
    /// Output with no events
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            events: Vec::new(),
        }
    }

    pub fn with_events(frame: Frame, events: Vec<String>) -> Self {
        Self { frame, events }
    }
}

/// A pure frame-processing capability
pub trait FrameTransform: Send + Sync + 'static {
    fn apply(&self, frame: &Frame) -> Result<TransformOutput, TransformFault>;
}

impl<F> FrameTransform for F
where
    F: Fn(&Frame) -> Result<TransformOutput, TransformFault> + Send + Sync + 'static,
{
    fn apply(&self, frame: &Frame) -> Result<TransformOutput, TransformFault> {
        self(frame)
    }
}

/// Identity transform
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl FrameTransform for Passthrough {
    fn apply(&self, frame: &Frame) -> Result<TransformOutput, TransformFault> {
        Ok(TransformOutput::new(frame.clone()))
    }
}

/// A registered transform: key, display label and function
#[derive(Clone)]
pub struct Transform {
    key: String,
    label: String,
    func: Arc<dyn FrameTransform>,
}

impl Transform {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Apply to one frame
    ///
    /// A panic inside the transform is reported as a fault like any error.
    pub fn apply(&self, frame: &Frame) -> Result<TransformOutput, TransformFault> {
        match catch_unwind(AssertUnwindSafe(|| self.func.apply(frame))) {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panicked".to_string());
                Err(TransformFault::new(&self.key, reason))
            }
        }
    }

    pub fn info(&self) -> TransformInfo {
        TransformInfo {
            key: self.key.clone(),
            label: self.label.clone(),
        }
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("key", &self.key)
            .field("label", &self.label)
            .finish()
    }
}

/// Discovery entry for a transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformInfo {
    pub key: String,
    pub label: String,
}

/// Ordered table of transforms
#[derive(Debug, Clone)]
pub struct TransformCatalog {
    transforms: Vec<Transform>,
    index: HashMap<String, usize>,
}

impl TransformCatalog {
    /// Create a catalog holding only the pass-through transform
    pub fn new() -> Self {
        let mut catalog = Self {
            transforms: Vec::new(),
            index: HashMap::new(),
        };
        catalog.register(PASSTHROUGH, "pass-through", Passthrough);
        catalog
    }

    /// Register a transform
    ///
    /// Registering an existing key replaces it in place, keeping its
    /// position in [`list`](Self::list).
    pub fn register(
        &mut self,
        key: impl Into<String>,
        label: impl Into<String>,
        transform: impl FrameTransform,
    ) -> &mut Self {
        let entry = Transform {
            key: key.into(),
            label: label.into(),
            func: Arc::new(transform),
        };

        match self.index.get(&entry.key).copied() {
            Some(pos) => {
                tracing::warn!(transform = %entry.key, "Transform registered twice, replacing");
                self.transforms[pos] = entry;
            }
            None => {
                self.index.insert(entry.key.clone(), self.transforms.len());
                self.transforms.push(entry);
            }
        }
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(
        mut self,
        key: impl Into<String>,
        label: impl Into<String>,
        transform: impl FrameTransform,
    ) -> Self {
        self.register(key, label, transform);
        self
    }

    pub fn lookup(&self, key: &str) -> Option<&Transform> {
        self.index.get(key).map(|&pos| &self.transforms[pos])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys and labels in registration order
    pub fn list(&self) -> Vec<TransformInfo> {
        self.transforms.iter().map(Transform::info).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Default for TransformCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn frame() -> Frame {
        Frame::video(9000, 1, 1, Bytes::from_static(&[10, 20, 30]))
    }

    fn invert(frame: &Frame) -> Result<TransformOutput, TransformFault> {
        let data: Vec<u8> = frame.data.iter().map(|b| 255 - b).collect();
        Ok(TransformOutput::new(Frame::video(
            frame.pts,
            frame.width,
            frame.height,
            Bytes::from(data),
        )))
    }

    #[test]
    fn test_passthrough_always_present() {
        let catalog = TransformCatalog::new();
        assert_eq!(catalog.len(), 1);
        let passthrough = catalog.lookup(PASSTHROUGH).unwrap();
        assert_eq!(passthrough.apply(&frame()).unwrap().frame, frame());
    }

    #[test]
    fn test_list_in_registration_order() {
        let catalog = TransformCatalog::new()
            .with("edges", "edges (canny)", invert)
            .with("qrcodes", "QR & bar codes", Passthrough)
            .with("red", "red labels", Passthrough);

        let keys: Vec<String> = catalog.list().into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["passthrough", "edges", "qrcodes", "red"]);
        assert_eq!(catalog.lookup("edges").unwrap().label(), "edges (canny)");
        assert!(catalog.lookup("blur").is_none());
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut catalog = TransformCatalog::new();
        catalog
            .register("edges", "old", Passthrough)
            .register("red", "red labels", Passthrough)
            .register("edges", "new", invert);

        let list = catalog.list();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1], TransformInfo { key: "edges".into(), label: "new".into() });
        let out = catalog.lookup("edges").unwrap().apply(&frame()).unwrap();
        assert_eq!(&out.frame.data[..], &[245, 235, 225]);
    }

    #[test]
    fn test_panic_becomes_fault() {
        let catalog = TransformCatalog::new().with(
            "boom",
            "boom",
            |_: &Frame| -> Result<TransformOutput, TransformFault> { panic!("bad pixel format") },
        );

        let fault = catalog.lookup("boom").unwrap().apply(&frame()).unwrap_err();
        assert_eq!(fault.transform, "boom");
        assert_eq!(fault.reason, "bad pixel format");
    }
}
