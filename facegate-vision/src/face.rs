use crate::yunet;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

/// YuNet input is a fixed 640x640 canvas.
pub const DETECTOR_INPUT: u32 = 640;
/// SFace input side, also the reference frame for the alignment landmarks.
pub const ALIGNED_SIZE: u32 = 112;

/// ArcFace reference eye centres in the 112x112 frame.
const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

/// A detected face in source-image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // eyes, nose, mouth corners as x,y pairs
}

/// Planar BGR float tensor `[1, 3, H, W]`, values in `[0, 255]`.
fn bgr_tensor(rgb: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = rgb.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, p) in rgb.pixels().enumerate() {
        data[i] = p[2] as f32;
        data[plane + i] = p[1] as f32;
        data[2 * plane + i] = p[0] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Detect faces, returned in descending score order.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    // letterbox onto a square canvas so the aspect ratio survives
    let (orig_w, orig_h) = img.dimensions();
    let scale = DETECTOR_INPUT as f32 / orig_w.max(orig_h) as f32;
    let new_w = ((orig_w as f32 * scale) as u32).max(1);
    let new_h = ((orig_h as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    let off_x = (DETECTOR_INPUT - new_w) / 2;
    let off_y = (DETECTOR_INPUT - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, off_x as i64, off_y as i64);

    let input = Value::from_array(bgr_tensor(&canvas.to_rgb8())?)?;
    let outputs = session.run(ort::inputs![input])?;

    let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        owned.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = owned
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let mut scales = yunet::parse_outputs(&refs, DETECTOR_INPUT as usize).context("parsing detector output")?;
    for s in &mut scales {
        s.scores.mapv_inplace(yunet::sigmoid);
    }
    let raw = yunet::decode(&scales, score_threshold, DETECTOR_INPUT as usize)?;

    // normalised canvas coords -> canvas pixels -> source pixels
    let side = DETECTOR_INPUT as f32;
    let to_src_x = |v: f32| (v * side - off_x as f32) / scale;
    let to_src_y = |v: f32| (v * side - off_y as f32) / scale;

    let detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for p in 0..5 {
                landmarks[p * 2] = to_src_x(d.landmarks[p * 2]);
                landmarks[p * 2 + 1] = to_src_y(d.landmarks[p * 2 + 1]);
            }
            Detection {
                bbox: [
                    to_src_x(d.bbox[0]),
                    to_src_y(d.bbox[1]),
                    d.bbox[2] * side / scale,
                    d.bbox[3] * side / scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    Ok(nms(&detections, nms_threshold))
}

/// Greedy non-maximum suppression; output is sorted by score, highest first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Rotate, scale and crop so the eyes land on the reference positions.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }

    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2) + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2)).sqrt();
    let unit = size as f32 / ALIGNED_SIZE as f32;
    let scale = unit * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    // forward map: out = M * src + t
    let (a, b) = (scale * angle.cos(), scale * angle.sin());
    let (c, d) = (-b, a);
    let src_c = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let dst_c = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
    );
    let tx = dst_c.0 - (a * src_c.0 + b * src_c.1);
    let ty = dst_c.1 - (c * src_c.0 + d * src_c.1);
    let det = a * d - b * c;

    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let out = RgbImage::from_fn(size, size, |ox, oy| {
        let (px, py) = (ox as f32 - tx, oy as f32 - ty);
        let sx = (d * px - b * py) / det;
        let sy = (-c * px + a * py) / det;
        if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
            return image::Rgb([0, 0, 0]);
        }
        // bilinear
        let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
        let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);
        let (p00, p10, p01, p11) = (
            src.get_pixel(x0, y0),
            src.get_pixel(x1, y0),
            src.get_pixel(x0, y1),
            src.get_pixel(x1, y1),
        );
        let mut px_out = [0u8; 3];
        for ch in 0..3 {
            let v = p00[ch] as f32 * (1.0 - fx) * (1.0 - fy)
                + p10[ch] as f32 * fx * (1.0 - fy)
                + p01[ch] as f32 * (1.0 - fx) * fy
                + p11[ch] as f32 * fx * fy;
            px_out[ch] = v as u8;
        }
        image::Rgb(px_out)
    });

    Ok(DynamicImage::ImageRgb8(out))
}

/// Run SFace on an aligned crop; the result is L2-normalised.
pub fn encode_face(session: &mut Session, face: &DynamicImage) -> Result<Array1<f32>> {
    let face = face
        .resize_exact(ALIGNED_SIZE, ALIGNED_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let input = Value::from_array(bgr_tensor(&face)?)?;

    let outputs = session.run(ort::inputs![input])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let len = if shape.len() == 2 { shape[1] as usize } else { data.len() };

    let mut vector = Array1::from(data[..len].to_vec());
    let norm = vector.dot(&vector).sqrt();
    if norm > 0.0 {
        vector /= norm;
    }
    Ok(vector)
}
