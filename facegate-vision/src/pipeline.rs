use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array1;
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;

use crate::face::{self, Detection, ALIGNED_SIZE};

/// Full pipeline: detect faces → align → encode.
///
/// Sessions sit behind mutexes so a shared `Pipeline` can serve
/// concurrent callers; inference itself is serialised per model.
pub struct Pipeline {
    detector: Mutex<Session>,
    encoder: Mutex<Session>,
    score_threshold: f32,
    nms_threshold: f32,
}

impl Pipeline {
    pub fn new(
        detector: &Path,
        recognizer: &Path,
        score_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Self> {
        Ok(Self {
            detector: Mutex::new(crate::model::detector_session(detector)?),
            encoder: Mutex::new(crate::model::recognizer_session(recognizer)?),
            score_threshold,
            nms_threshold,
        })
    }

    pub fn detect(&self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow::anyhow!("detector session lock poisoned"))?;
        face::detect_faces(&mut detector, img, self.score_threshold, self.nms_threshold)
            .context("detecting faces")
    }

    /// One embedding per detected face, best detection first.
    ///
    /// An image without faces yields an empty vec, not an error.
    pub fn embed_all(&self, img: &DynamicImage) -> Result<Vec<Array1<f32>>> {
        let detections = self.detect(img)?;
        log::debug!("detected {} face(s)", detections.len());

        let mut encoder = self
            .encoder
            .lock()
            .map_err(|_| anyhow::anyhow!("encoder session lock poisoned"))?;
        detections
            .iter()
            .map(|det| -> Result<Array1<f32>> {
                let aligned = face::align_face(img, det, ALIGNED_SIZE).context("aligning face")?;
                face::encode_face(&mut encoder, &aligned).context("encoding face")
            })
            .collect()
    }
}
