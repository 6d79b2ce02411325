//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) the model emits four
//! tensors over an `(input / stride)^2` grid: `cls` [1, N, 1], `obj` [1, N, 1],
//! `bbox` [1, N, 4] and `kps` [1, N, 10]. Output order is all `cls`, then all
//! `obj`, then all `bbox`, then all `kps`, each group ordered by stride.
//!
//! Grid decoding:
//! cx = (col + dx) * stride, cy = (row + dy) * stride,
//! w = dw * stride, h = dh * stride, all normalised by the input size.

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Detection in normalised `[0, 1]` canvas coordinates.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Per-stride maps, already reshaped to `(locations, channels)`.
#[derive(Debug, Clone)]
pub struct ScaleOutputs {
    pub scores: Array2<f32>,
    pub bboxes: Array2<f32>,
    pub landmarks: Array2<f32>,
}

/// Group the twelve raw outputs into one [`ScaleOutputs`] per stride.
///
/// Scores are `cls * obj`; apply [`sigmoid`] afterwards if the model emits logits.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<ScaleOutputs>> {
    let group = |offset: usize, channels: usize, name: &str| -> Result<Vec<Array2<f32>>> {
        STRIDES
            .iter()
            .enumerate()
            .map(|(scale, &stride)| -> Result<Array2<f32>> {
                let idx = offset + scale;
                let cells = (input_size / stride).pow(2);
                let (shape, data) = outputs
                    .get(idx)
                    .ok_or_else(|| anyhow::anyhow!("missing {} output at index {}", name, idx))?;
                if shape.len() != 3
                    || shape[0] != 1
                    || shape[1] as usize != cells
                    || shape[2] as usize != channels
                {
                    anyhow::bail!(
                        "unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
                        name,
                        idx,
                        shape,
                        cells,
                        channels
                    );
                }
                Ok(Array2::from_shape_vec((cells, channels), data.to_vec())?)
            })
            .collect()
    };

    let cls = group(0, 1, "cls")?;
    let obj = group(3, 1, "obj")?;
    let bbox = group(6, 4, "bbox")?;
    let kps = group(9, 10, "kps")?;

    Ok(cls
        .into_iter()
        .zip(obj)
        .zip(bbox.into_iter().zip(kps))
        .map(|((cls, obj), (bboxes, landmarks))| ScaleOutputs {
            scores: cls * obj,
            bboxes,
            landmarks,
        })
        .collect())
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode every grid cell scoring at least `score_threshold`.
pub fn decode(scales: &[ScaleOutputs], score_threshold: f32, input_size: usize) -> Result<Vec<RawDetection>> {
    if scales.len() != STRIDES.len() {
        anyhow::bail!("expected {} scales, got {}", STRIDES.len(), scales.len());
    }

    let size = input_size as f32;
    let mut detections = Vec::new();

    for (out, &stride) in scales.iter().zip(STRIDES.iter()) {
        let grid = input_size / stride;
        if out.scores.nrows() != grid * grid {
            anyhow::bail!(
                "stride {} expects {} cells, got {}",
                stride,
                grid * grid,
                out.scores.nrows()
            );
        }
        let s = stride as f32;

        for (idx, &score) in out.scores.column(0).iter().enumerate() {
            if score < score_threshold {
                continue;
            }
            let (row, col) = ((idx / grid) as f32, (idx % grid) as f32);
            let b = out.bboxes.row(idx);

            let cx = (col + b[0]) * s / size;
            let cy = (row + b[1]) * s / size;
            let w = b[2] * s / size;
            let h = b[3] * s / size;

            let k = out.landmarks.row(idx);
            let mut landmarks = [0.0f32; 10];
            for p in 0..5 {
                landmarks[p * 2] = (col + k[p * 2]) * s / size;
                landmarks[p * 2 + 1] = (row + k[p * 2 + 1]) * s / size;
            }

            detections.push(RawDetection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    Ok(detections)
}
