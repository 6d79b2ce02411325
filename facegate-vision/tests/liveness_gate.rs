use facegate_vision::{LivenessGate, Verdict};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

fn encode(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// 0/100 checkerboard: plenty of detail, nothing bright.
fn checker(x: u32, y: u32) -> u8 {
    if (x + y) % 2 == 0 {
        0
    } else {
        100
    }
}

/// 10x10 checkerboard whose first `bright` pixels (row-major) are white.
fn with_bright_pixels(bright: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(10, 10, |x, y| {
        if y * 10 + x < bright {
            Rgb([255, 255, 255])
        } else {
            let v = checker(x, y);
            Rgb([v, v, v])
        }
    }))
}

#[test]
fn test_overexposed_image_rejected() {
    env_logger::try_init().ok();
    let gate = LivenessGate::default();

    let report = gate.evaluate(&with_bright_pixels(26));
    assert_eq!(report.verdict, Verdict::Overexposed);
    assert!((report.bright_fraction - 0.26).abs() < 1e-9);
    assert!(report.laplacian_variance.is_none());
    assert!(!gate.is_live(&encode(&with_bright_pixels(26))).unwrap());
}

#[test]
fn test_brightness_boundary_is_exclusive() {
    let gate = LivenessGate::default();

    let report = gate.evaluate(&with_bright_pixels(24));
    assert_eq!(report.verdict, Verdict::Live);
    assert!(gate.is_live(&encode(&with_bright_pixels(24))).unwrap());

    // exactly 25% is not "more than" 25%
    let report = gate.evaluate(&with_bright_pixels(25));
    assert_ne!(report.verdict, Verdict::Overexposed);
}

#[test]
fn test_pixels_at_cutoff_are_not_bright() {
    let gate = LivenessGate::default();
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(10, 10, |x, y| {
        if y < 5 {
            Luma([250])
        } else {
            Luma([checker(x, y)])
        }
    }));
    let report = gate.evaluate(&img);
    assert_eq!(report.bright_fraction, 0.0);
}

#[test]
fn test_flat_image_rejected() {
    let gate = LivenessGate::default();
    let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([120, 120, 120])));

    let report = gate.evaluate(&flat);
    assert_eq!(report.verdict, Verdict::LowDetail);
    assert_eq!(report.laplacian_variance, Some(0.0));
    assert!(!gate.is_live(&encode(&flat)).unwrap());
}

#[test]
fn test_checkerboard_accepted() {
    let gate = LivenessGate::default();
    let board = DynamicImage::ImageLuma8(GrayImage::from_fn(32, 32, |x, y| {
        Luma([if (x / 4 + y / 4) % 2 == 0 { 0 } else { 200 }])
    }));
    assert!(gate.is_live(&encode(&board)).unwrap());
}

#[test]
fn test_alpha_and_grey_inputs_normalised() {
    let gate = LivenessGate::default();
    let rgba = DynamicImage::ImageRgba8(RgbaImage::from_fn(16, 16, |x, y| {
        let v = checker(x, y);
        Rgba([v, v, v, 10])
    }));
    let grey = DynamicImage::ImageLuma8(GrayImage::from_fn(16, 16, |x, y| Luma([checker(x, y)])));

    assert_eq!(gate.evaluate(&rgba), gate.evaluate(&grey));
    assert!(gate.is_live(&encode(&rgba)).unwrap());
}

#[test]
fn test_thresholds_are_tunable() {
    // 0/2 checkerboard: laplacian variance is 64
    let faint = DynamicImage::ImageLuma8(GrayImage::from_fn(16, 16, |x, y| {
        Luma([if (x + y) % 2 == 0 { 0 } else { 2 }])
    }));
    let strict = LivenessGate {
        min_laplacian_variance: 100.0,
        ..LivenessGate::default()
    };
    assert!(LivenessGate::default().check(&faint));
    assert!(!strict.check(&faint));

    let lenient = LivenessGate {
        max_bright_fraction: 0.5,
        ..LivenessGate::default()
    };
    assert!(lenient.check(&with_bright_pixels(40)));
    assert!(!LivenessGate::default().check(&with_bright_pixels(40)));
}

#[test]
fn test_undecodable_bytes_are_an_error() {
    let gate = LivenessGate::default();
    assert!(gate.is_live(b"definitely not an image").is_err());
}
