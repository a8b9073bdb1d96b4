use super::*;
use crate::foundation::core::FrameIndex;
use crate::foundation::plane::Plane;

fn still_pair() -> FramePair {
    FramePair {
        frame: FrameIndex(0),
        flow: Plane::from_fn(3, 1, |_, _| [0.0, 0.0]),
        ids: Plane::from_vec(3, 1, vec![1, 1, 0]).unwrap(),
        corresp: Plane::from_fn(3, 1, |_, _| [200.0, 100.0, 40.0]),
        occlusion: Plane::from_vec(3, 1, vec![0, 255, 0]).unwrap(),
        alpha: Plane::from_fn(3, 1, |_, _| 255),
        next_ids: Plane::from_fn(3, 1, |_, _| 1),
        next_corresp: Plane::from_fn(3, 1, |_, _| [200.0, 100.0, 40.0]),
    }
}

#[test]
fn pixels_are_colored_by_verdict() {
    let img = render_debug_image(&still_pair(), &SanityConfig::default());
    assert_eq!(*img.get_pixel(0, 0), Rgb([0, 255, 0]));
    assert_eq!(*img.get_pixel(1, 0), Rgb([255, 255, 255]));
    // Background keeps the dimmed correspondence color.
    assert_eq!(*img.get_pixel(2, 0), Rgb([100, 50, 20]));
}

#[test]
fn mismatch_colors_are_distinct() {
    let kinds = [
        PixelVerdict::Sane,
        PixelVerdict::OutOfFrame,
        PixelVerdict::IdMismatch,
        PixelVerdict::CorrespMismatch,
        PixelVerdict::Occluded,
        PixelVerdict::OccludedConsistent,
    ];
    let mut colors: Vec<[u8; 3]> = kinds.iter().map(|&k| verdict_color(k).0).collect();
    colors.sort();
    colors.dedup();
    assert_eq!(colors.len(), kinds.len());
    assert_eq!(verdict_color(PixelVerdict::IdMismatch), Rgb([255, 150, 0]));
}

#[test]
fn debug_image_is_written_as_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/debug.png");
    save_debug_image(&path, &still_pair(), &SanityConfig::default()).unwrap();
    let back = image::open(&path).unwrap().to_rgb8();
    assert_eq!(back.dimensions(), (3, 1));
}
