//! Single-image liveness heuristics.
//!
//! Two checks run over the luminance channel, in order:
//! - overexposure: too many near-white pixels points at screen glare or a
//!   washed-out print;
//! - detail: the variance of the Laplacian response is a focus/texture
//!   measure, and reproductions lose the fine texture of a live capture.
//!
//! Everything here is a pure function of the pixel data.

use image::{DynamicImage, GrayImage, ImageResult};
use serde::{Deserialize, Serialize};

/// Fixed-point BT.601 luma weights, scaled by 2^14.
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Tunable thresholds for the liveness gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessGate {
    /// Luminance strictly above this value counts as "bright".
    pub bright_cutoff: u8,
    /// Reject when the bright fraction is strictly above this.
    pub max_bright_fraction: f64,
    /// Reject when the Laplacian variance is strictly below this.
    pub min_laplacian_variance: f64,
}

impl Default for LivenessGate {
    fn default() -> Self {
        Self {
            bright_cutoff: 250,
            max_bright_fraction: 0.25,
            min_laplacian_variance: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Live,
    /// Too many saturated pixels.
    Overexposed,
    /// Not enough high-frequency detail.
    LowDetail,
}

/// Measurements behind a liveness decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessReport {
    pub bright_fraction: f64,
    /// Not computed when the overexposure check already rejected the image.
    pub laplacian_variance: Option<f64>,
    pub verdict: Verdict,
}

impl LivenessReport {
    pub fn is_live(&self) -> bool {
        self.verdict == Verdict::Live
    }
}

impl LivenessGate {
    /// Decode `bytes` and classify the image.
    ///
    /// Undecodable input is an error, never a rejection.
    pub fn is_live(&self, bytes: &[u8]) -> ImageResult<bool> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.check(&img))
    }

    pub fn check(&self, img: &DynamicImage) -> bool {
        self.evaluate(img).is_live()
    }

    pub fn evaluate(&self, img: &DynamicImage) -> LivenessReport {
        let gray = luminance(img);
        if gray.width() == 0 || gray.height() == 0 {
            return LivenessReport {
                bright_fraction: 0.0,
                laplacian_variance: None,
                verdict: Verdict::LowDetail,
            };
        }

        let bright_fraction = bright_fraction(&gray, self.bright_cutoff);
        if bright_fraction > self.max_bright_fraction {
            log::debug!(
                "liveness: overexposed, bright fraction {:.4} > {:.4}",
                bright_fraction,
                self.max_bright_fraction
            );
            return LivenessReport {
                bright_fraction,
                laplacian_variance: None,
                verdict: Verdict::Overexposed,
            };
        }

        let variance = laplacian_variance(&gray);
        let verdict = if variance < self.min_laplacian_variance {
            Verdict::LowDetail
        } else {
            Verdict::Live
        };
        log::debug!(
            "liveness: bright fraction {:.4}, laplacian variance {:.2} -> {:?}",
            bright_fraction,
            variance,
            verdict
        );

        LivenessReport {
            bright_fraction,
            laplacian_variance: Some(variance),
            verdict,
        }
    }
}

/// Convert any input (grey, alpha, 16-bit) to RGB, then to 8-bit luminance.
pub fn luminance(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let luma = rgb
        .pixels()
        .map(|p| {
            let y = p[0] as u32 * R_WEIGHT
                + p[1] as u32 * G_WEIGHT
                + p[2] as u32 * B_WEIGHT
                + (1 << (LUMA_SHIFT - 1));
            (y >> LUMA_SHIFT) as u8
        })
        .collect();
    // the buffer length always equals width * height
    GrayImage::from_raw(width, height, luma).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Fraction of pixels with luminance strictly above `cutoff`.
pub fn bright_fraction(gray: &GrayImage, cutoff: u8) -> f64 {
    let total = gray.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let bright = gray.as_raw().iter().filter(|&&v| v > cutoff).count();
    bright as f64 / total as f64
}

/// Population variance of the 4-neighbour Laplacian response.
///
/// Borders are mirrored without repeating the edge pixel (`dcb|abcd|cba`).
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as i64, height as i64);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let px = |x: i64, y: i64| -> f64 {
        let x = reflect101(x, w);
        let y = reflect101(y, h);
        gray.get_pixel(x as u32, y as u32)[0] as f64
    };

    let mut response = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            response.push(lap);
        }
    }

    let n = response.len() as f64;
    let mean = response.iter().sum::<f64>() / n;
    response.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

fn reflect101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    }
}
