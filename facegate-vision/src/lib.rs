//! Image-side building blocks: the liveness gate and, with the `onnx`
//! feature, a YuNet + SFace face embedding pipeline.

pub mod liveness;

#[cfg(feature = "onnx")]
pub mod face;
#[cfg(feature = "onnx")]
pub mod model;
#[cfg(feature = "onnx")]
pub mod pipeline;
#[cfg(feature = "onnx")]
pub mod yunet;

pub use liveness::{LivenessGate, LivenessReport, Verdict};

#[cfg(feature = "onnx")]
pub use face::Detection;
#[cfg(feature = "onnx")]
pub use pipeline::Pipeline;
