use std::collections::HashMap;
use std::io::Cursor;

use facegate::{
    EmbeddingSource, EmbeddingStore, Error, FileStore, LivenessGate, MemoryStore, Metadata,
    Recognizer, EMBEDDING_DIM, UNKNOWN_LABEL,
};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};
use ndarray::Array1;

/// Hands out preset embeddings keyed by the image width.
struct FakeSource {
    faces: HashMap<u32, Vec<Array1<f32>>>,
}

impl EmbeddingSource for FakeSource {
    fn extract(&self, img: &DynamicImage) -> anyhow::Result<Vec<Array1<f32>>> {
        match self.faces.get(&img.width()) {
            Some(faces) => Ok(faces.clone()),
            None => anyhow::bail!("model crashed on {}x{}", img.width(), img.height()),
        }
    }
}

fn emb(head: &[f32]) -> Array1<f32> {
    let mut v = Array1::zeros(EMBEDDING_DIM);
    for (i, x) in head.iter().enumerate() {
        v[i] = *x;
    }
    v
}

fn png(img: DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Textured image that passes the liveness gate.
fn live_image(width: u32) -> Vec<u8> {
    png(DynamicImage::ImageLuma8(GrayImage::from_fn(width, 16, |x, y| {
        Luma([if (x + y) % 2 == 0 { 20 } else { 180 }])
    })))
}

/// Uniform image that fails the liveness gate.
fn flat_image(width: u32) -> Vec<u8> {
    png(DynamicImage::ImageLuma8(GrayImage::from_pixel(width, 16, Luma([90]))))
}

// image widths used as "identities" for the fake source
const ALICE: u32 = 20;
const BOB: u32 = 21;
const NEAR_ALICE: u32 = 22;
const NOBODY: u32 = 23;
const GROUP: u32 = 24;
const BROKEN: u32 = 25;
const MALFORMED: u32 = 26;

fn source() -> FakeSource {
    // |E1 - E2| = 2; the probe sits 1.5 from E1 and 3.0 from E2
    let e1 = emb(&[]);
    let e2 = emb(&[2.0]);
    let x = -0.6875f32;
    let probe = emb(&[x, (2.25 - x * x).sqrt()]);

    let mut faces = HashMap::new();
    faces.insert(ALICE, vec![e1.clone()]);
    faces.insert(BOB, vec![e2.clone()]);
    faces.insert(NEAR_ALICE, vec![probe]);
    faces.insert(NOBODY, vec![]);
    faces.insert(GROUP, vec![e2, e1]);
    faces.insert(MALFORMED, vec![Array1::zeros(64)]);
    FakeSource { faces }
}

fn recognizer() -> Recognizer<MemoryStore, FakeSource> {
    Recognizer::new(LivenessGate::default(), MemoryStore::new(), source(), 0.6)
}

#[test]
fn test_enroll_then_identify() {
    env_logger::try_init().ok();
    let r = recognizer();
    assert_eq!(r.enroll("alice", &live_image(ALICE)).unwrap(), 1);
    assert_eq!(r.enroll("bob", &live_image(BOB)).unwrap(), 1);

    let res = r.identify(&live_image(ALICE), 0.6).unwrap();
    assert_eq!(res.label, "alice");
    assert_eq!(res.distance, 0.0);

    let res = r.identify(&live_image(NEAR_ALICE), 0.6).unwrap();
    assert_eq!(res.label, UNKNOWN_LABEL);
    assert!((res.distance - 1.5).abs() < 1e-5, "distance {}", res.distance);

    // a looser threshold accepts the same probe
    let res = r.identify(&live_image(NEAR_ALICE), 2.0).unwrap();
    assert_eq!(res.label, "alice");
}

#[test]
fn test_identify_uses_configured_tau() {
    let r = Recognizer::new(LivenessGate::default(), MemoryStore::new(), source(), 1.6);
    r.enroll("alice", &live_image(ALICE)).unwrap();
    assert_eq!(r.identify_default(&live_image(NEAR_ALICE)).unwrap().label, "alice");
}

#[test]
fn test_identify_against_empty_store() {
    let r = recognizer();
    let res = r.identify(&live_image(ALICE), 0.6).unwrap();
    assert_eq!(res.label, UNKNOWN_LABEL);
    assert_eq!(res.distance, 1.0);
}

#[test]
fn test_enroll_stores_every_face() {
    let r = recognizer();
    let mut metadata = Metadata::new();
    metadata.insert("filename".to_string(), "team.png".to_string());

    assert_eq!(r.enroll_with_metadata("team", &live_image(GROUP), &metadata).unwrap(), 2);
    let records = r.store().records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|rec| rec.label == "team"));
    assert!(records.iter().all(|rec| rec.metadata == metadata));
}

#[test]
fn test_identify_uses_first_face_only() {
    let r = recognizer();
    r.enroll("alice", &live_image(ALICE)).unwrap();
    r.enroll("bob", &live_image(BOB)).unwrap();

    // first face in the group shot is bob's embedding
    let res = r.identify(&live_image(GROUP), 0.6).unwrap();
    assert_eq!(res.label, "bob");
}

#[test]
fn test_liveness_rejection() {
    let r = recognizer();
    assert!(!r.is_live(&flat_image(ALICE)).unwrap());
    assert!(r.is_live(&live_image(ALICE)).unwrap());

    assert!(matches!(r.enroll("alice", &flat_image(ALICE)), Err(Error::LivenessRejected)));
    assert!(matches!(r.identify(&flat_image(ALICE), 0.6), Err(Error::LivenessRejected)));
    assert_eq!(r.store().len().unwrap(), 0);
}

#[test]
fn test_no_face_detected() {
    let r = recognizer();
    assert!(matches!(r.enroll("ghost", &live_image(NOBODY)), Err(Error::NoFaceDetected)));
    assert!(matches!(r.identify(&live_image(NOBODY), 0.6), Err(Error::NoFaceDetected)));
}

#[test]
fn test_decode_error_is_distinct() {
    let r = recognizer();
    let garbage = b"\x89PNG but not really";
    assert!(matches!(r.is_live(garbage), Err(Error::Decode(_))));
    assert!(matches!(r.enroll("alice", garbage), Err(Error::Decode(_))));
    assert!(matches!(r.identify(garbage, 0.6), Err(Error::Decode(_))));
}

#[test]
fn test_source_failures_surface() {
    let r = recognizer();
    let err = r.enroll("alice", &live_image(BROKEN)).unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
    assert!(!err.is_rejection());

    let err = r.enroll("alice", &live_image(MALFORMED)).unwrap_err();
    assert!(matches!(err, Error::Dimension { expected: 128, actual: 64 }));
    assert_eq!(r.store().len().unwrap(), 0);
}

#[test]
fn test_file_backed_workflow() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("faces.log");
    {
        let r = Recognizer::new(LivenessGate::default(), FileStore::open(&path).unwrap(), source(), 0.6);
        r.enroll("alice", &live_image(ALICE)).unwrap();
        r.enroll("bob", &live_image(BOB)).unwrap();
    }

    // a fresh instance re-reads everything from disk
    let r = Recognizer::new(LivenessGate::default(), FileStore::open(&path).unwrap(), source(), 0.6);
    let res = r.identify(&live_image(BOB), 0.6).unwrap();
    assert_eq!(res.label, "bob");
    assert_eq!(res.distance, 0.0);
}

#[test]
fn test_images_decode_to_expected_size() {
    let img = image::load_from_memory(&live_image(ALICE)).unwrap();
    assert_eq!(img.dimensions(), (ALICE, 16));
}
