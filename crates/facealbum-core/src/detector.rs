//! Face detector seam.
//!
//! Detection, landmarking and descriptor extraction are an external model.
//! Components receive it as an explicitly injected [`FaceDetector`], loaded
//! once and shared by reference through [`SharedDetector`].

use crate::types::Detection;
use image::DynamicImage;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// A photo handed to the detector: decoded pixels plus the name it was staged under.
#[derive(Clone, Copy)]
pub struct Photo<'a> {
    pub name: &'a str,
    pub image: &'a DynamicImage,
}

/// Maps one photo to every face the model finds in it.
///
/// Each call is a suspension point; callers never run two detections at once.
pub trait FaceDetector {
    fn detect(
        &self,
        photo: Photo<'_>,
    ) -> impl Future<Output = Result<Vec<Detection>, DetectorError>> + Send;
}

/// Detector loaded once and shared by reference across components.
pub struct SharedDetector<D> {
    inner: Arc<D>,
}

impl<D> SharedDetector<D> {
    /// Run the one-time initialization of the model.
    pub fn load<E>(init: impl FnOnce() -> Result<D, E>) -> Result<Self, E> {
        let detector = init()?;
        tracing::info!("face detector loaded");
        Ok(Self {
            inner: Arc::new(detector),
        })
    }

    pub fn get(&self) -> &D {
        &self.inner
    }
}

impl<D> Clone for SharedDetector<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> FaceDetector for SharedDetector<D>
where
    D: FaceDetector + Send + Sync,
{
    fn detect(
        &self,
        photo: Photo<'_>,
    ) -> impl Future<Output = Result<Vec<Detection>, DetectorError>> + Send {
        self.inner.detect(photo)
    }
}
