use crate::error::{Error, Result};
use image::DynamicImage;
use ndarray::{Array1, ArrayView1};

/// Every stored and queried embedding has exactly this many components.
pub const EMBEDDING_DIM: usize = 128;

/// A face descriptor of [`EMBEDDING_DIM`] single-precision floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Array1<f32>);

impl Embedding {
    pub fn new(vector: Array1<f32>) -> Result<Self> {
        check_dim(vector.len())?;
        // strided arrays are copied so `as_slice` always sees every component
        let vector = if vector.is_standard_layout() {
            vector
        } else {
            vector.as_standard_layout().into_owned()
        };
        Ok(Self(vector))
    }

    pub fn from_slice(values: &[f32]) -> Result<Self> {
        Self::new(Array1::from(values.to_vec()))
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.0.view()
    }

    pub fn as_slice(&self) -> &[f32] {
        // standard layout is guaranteed by `new`
        self.0.as_slice().unwrap_or(&[])
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0.to_vec()
    }
}

pub(crate) fn check_dim(actual: usize) -> Result<()> {
    if actual != EMBEDDING_DIM {
        return Err(Error::Dimension {
            expected: EMBEDDING_DIM,
            actual,
        });
    }
    Ok(())
}

/// The face detection + descriptor model.
///
/// Returns one vector per detected face, most confident first. An empty
/// result means no face was found; `Err` means the model itself failed.
pub trait EmbeddingSource: Send + Sync {
    fn extract(&self, img: &DynamicImage) -> anyhow::Result<Vec<Array1<f32>>>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxSource;

#[cfg(feature = "onnx")]
mod onnx {
    use super::EmbeddingSource;
    use crate::config::ModelConfig;
    use anyhow::{Context, Result};
    use facegate_vision::Pipeline;
    use image::DynamicImage;
    use ndarray::Array1;

    /// YuNet detector + SFace recognizer.
    pub struct OnnxSource {
        pipeline: Pipeline,
    }

    impl OnnxSource {
        pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
            let pipeline = Pipeline::new(
                &cfg.detector,
                &cfg.recognizer,
                cfg.score_threshold,
                cfg.nms_threshold,
            )
            .context("initializing face recognition pipeline")?;
            Ok(Self { pipeline })
        }
    }

    impl EmbeddingSource for OnnxSource {
        fn extract(&self, img: &DynamicImage) -> Result<Vec<Array1<f32>>> {
            self.pipeline.embed_all(img)
        }
    }
}
