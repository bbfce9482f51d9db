//! Detector backed by precomputed detections.
//!
//! Each photo `PATH` is accompanied by `PATH.faces.json`, written by whatever
//! face model the user runs:
//!
//! ```json
//! [ { "box": { "x": 10, "y": 20, "width": 240, "height": 250 },
//!     "score": 0.97, "descriptor": [0.01, -0.12, ...] } ]
//! ```

use facealbum_core::detector::{DetectorError, FaceDetector, Photo};
use facealbum_core::types::{BoundingBox, Detection, Embedding};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct SidecarFace {
    #[serde(rename = "box")]
    bbox: BoundingBox,
    score: f32,
    descriptor: Vec<f32>,
}

pub struct SidecarDetector {
    /// Descriptor space the sidecars were produced in.
    model_version: Option<String>,
}

impl SidecarDetector {
    pub fn new(model_version: Option<String>) -> Self {
        Self { model_version }
    }

    pub fn sidecar_path(photo_name: &str) -> PathBuf {
        PathBuf::from(format!("{photo_name}.faces.json"))
    }

    fn parse(&self, text: &str) -> Result<Vec<Detection>, DetectorError> {
        let faces: Vec<SidecarFace> = serde_json::from_str(text)
            .map_err(|e| DetectorError::DetectionFailed(format!("invalid sidecar: {e}")))?;
        Ok(faces
            .into_iter()
            .map(|face| {
                let descriptor = Embedding::new(face.descriptor);
                Detection {
                    bbox: face.bbox,
                    score: face.score,
                    descriptor: match &self.model_version {
                        Some(model) => descriptor.with_model_version(model.as_str()),
                        None => descriptor,
                    },
                }
            })
            .collect())
    }
}

impl FaceDetector for SidecarDetector {
    async fn detect(&self, photo: Photo<'_>) -> Result<Vec<Detection>, DetectorError> {
        let path = Self::sidecar_path(photo.name);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DetectorError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let detections = self.parse(&text)?;
        tracing::debug!(
            photo = photo.name,
            width = photo.image.width(),
            height = photo.image.height(),
            faces = detections.len(),
            "detections loaded"
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    const SIDECAR: &str = r#"[
        { "box": { "x": 10, "y": 20, "width": 240, "height": 250 }, "score": 0.97, "descriptor": [0.1, 0.2] },
        { "box": { "x": 300.5, "y": 0, "width": 90, "height": 80 }, "score": 0.6, "descriptor": [0.3, 0.4] }
    ]"#;

    #[tokio::test]
    async fn test_reads_sidecar_next_to_photo() {
        let dir = tempfile::tempdir().unwrap();
        let photo_path = dir.path().join("party.jpg");
        std::fs::write(dir.path().join("party.jpg.faces.json"), SIDECAR).unwrap();
        let name = photo_path.to_string_lossy().into_owned();
        let image = DynamicImage::new_rgb8(8, 8);

        let detections = SidecarDetector::new(Some("face-api".into()))
            .detect(Photo {
                name: &name,
                image: &image,
            })
            .await
            .unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bbox, BoundingBox::new(10.0, 20.0, 240.0, 250.0));
        assert_eq!(detections[0].score, 0.97);
        assert_eq!(detections[1].descriptor.values, vec![0.3, 0.4]);
        assert_eq!(
            detections[1].descriptor.model_version.as_deref(),
            Some("face-api")
        );
    }

    #[tokio::test]
    async fn test_missing_sidecar_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("alone.jpg").to_string_lossy().into_owned();
        let image = DynamicImage::new_rgb8(8, 8);
        let err = SidecarDetector::new(None)
            .detect(Photo {
                name: &name,
                image: &image,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::Unavailable(_)));
    }

    #[test]
    fn test_malformed_sidecar() {
        let err = SidecarDetector::new(None).parse("{ \"faces\": 3 }").unwrap_err();
        assert!(matches!(err, DetectorError::DetectionFailed(_)));
    }
}
