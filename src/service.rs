//! Enrollment and identification: liveness gate → embedding source →
//! store / matcher.

use facegate_vision::LivenessGate;
use log::{debug, info};

use crate::config::Config;
use crate::embedding::{Embedding, EmbeddingSource};
use crate::error::{Error, Result};
use crate::matcher::MatchResult;
use crate::storage::{EmbeddingStore, Metadata};

pub struct Recognizer<S, E> {
    gate: LivenessGate,
    store: S,
    source: E,
    tau: f32,
}

impl<S: EmbeddingStore, E: EmbeddingSource> Recognizer<S, E> {
    pub fn new(gate: LivenessGate, store: S, source: E, tau: f32) -> Self {
        Self {
            gate,
            store,
            source,
            tau,
        }
    }

    pub fn from_config(cfg: &Config, store: S, source: E) -> Self {
        Self::new(cfg.liveness, store, source, cfg.matcher.tau)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_live(&self, bytes: &[u8]) -> Result<bool> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.gate.check(&img))
    }

    /// Store one record per detected face, all under `label`.
    pub fn enroll(&self, label: &str, bytes: &[u8]) -> Result<usize> {
        self.enroll_with_metadata(label, bytes, &Metadata::new())
    }

    pub fn enroll_with_metadata(&self, label: &str, bytes: &[u8], metadata: &Metadata) -> Result<usize> {
        let faces = self.admit(bytes)?;
        for face in &faces {
            let id = self.store.append(label, face.as_slice(), metadata)?;
            debug!("stored record {} for {}", id, label);
        }
        info!("enrolled {} face(s) for {}", faces.len(), label);
        Ok(faces.len())
    }

    /// Match the first detected face; any other faces are ignored.
    pub fn identify(&self, bytes: &[u8], tau: f32) -> Result<MatchResult> {
        let faces = self.admit(bytes)?;
        let gallery = self.store.load_all()?;
        let result = gallery.find_match(&faces[0], tau)?;
        info!(
            "identified {} at distance {:.4} (tau {:.3}, {} enrolled)",
            result.label,
            result.distance,
            tau,
            gallery.len()
        );
        Ok(result)
    }

    pub fn identify_default(&self, bytes: &[u8]) -> Result<MatchResult> {
        self.identify(bytes, self.tau)
    }

    /// Decode, gate and extract. On success at least one face is returned,
    /// and every face has a valid dimension.
    fn admit(&self, bytes: &[u8]) -> Result<Vec<Embedding>> {
        let img = image::load_from_memory(bytes)?;
        if !self.gate.check(&img) {
            info!("rejected image: failed liveness checks");
            return Err(Error::LivenessRejected);
        }

        let vectors = self.source.extract(&img).map_err(Error::Extraction)?;
        if vectors.is_empty() {
            info!("rejected image: no face detected");
            return Err(Error::NoFaceDetected);
        }
        vectors.into_iter().map(Embedding::new).collect()
    }
}
