use super::*;
use crate::foundation::plane::Plane;

/// Linear correspondence ramp carried exactly by a uniform `flow`.
fn pair(frame: u32, w: u32, h: u32, flow: [f32; 2]) -> FramePair {
    let ramp = |x: f32, y: f32| [x * 10.0, y * 10.0, 50.0];
    FramePair {
        frame: FrameIndex(frame),
        flow: Plane::from_fn(w, h, |_, _| flow),
        ids: Plane::from_fn(w, h, |_, _| 1),
        corresp: Plane::from_fn(w, h, |x, y| ramp(x as f32, y as f32)),
        occlusion: Plane::from_fn(w, h, |_, _| 0),
        alpha: Plane::from_fn(w, h, |_, _| 255),
        next_ids: Plane::from_fn(w, h, |_, _| 1),
        next_corresp: Plane::from_fn(w, h, |x, y| ramp(x as f32 - flow[0], y as f32 - flow[1])),
    }
}

fn config() -> SanityConfig {
    SanityConfig {
        npixels: 10_000,
        nframes: None,
        ..SanityConfig::default()
    }
}

#[test]
fn identity_flow_is_fully_sane() {
    let pairs = vec![pair(1, 6, 5, [0.0, 0.0]), pair(2, 6, 5, [0.0, 0.0])];
    let report = check_pairs(&pairs, &config()).unwrap();
    assert_eq!(report.tested, 60);
    assert_eq!(report.sane, 60);
    assert_eq!(report.score, 1.0);
    assert!(report.passed);
    assert!(report.summary_line().contains("score 1.0000"));
}

#[test]
fn shifted_flow_leaves_last_column_out_of_frame() {
    let p = pair(1, 4, 3, [1.0, 0.0]);
    assert_eq!(classify_pixel(&p, 0, 0, &config()), PixelVerdict::Sane);
    assert_eq!(classify_pixel(&p, 2, 2, &config()), PixelVerdict::Sane);
    assert_eq!(classify_pixel(&p, 3, 1, &config()), PixelVerdict::OutOfFrame);

    let report = check_pairs(&[p], &config()).unwrap();
    assert_eq!(report.tested, 12);
    assert_eq!(report.sane, 9);
    assert_eq!(report.frames[0].out_of_frame, 3);
    assert!(!report.passed);
    assert_eq!(
        report.frames[0].mismatches[0],
        PixelMismatch {
            x: 3,
            y: 0,
            verdict: PixelVerdict::OutOfFrame
        }
    );
    let line = report.summary_line();
    assert!(
        line.contains("first mismatches: frame 000001 (3, 0) out of frame"),
        "{line}"
    );
}

#[test]
fn destination_within_border_margin_is_compared_at_the_edge() {
    let p = pair(1, 4, 1, [0.3, 0.0]);
    assert_eq!(classify_pixel(&p, 3, 0, &config()), PixelVerdict::Sane);

    let strict = SanityConfig {
        border_margin_px: 0.0,
        ..config()
    };
    assert_eq!(classify_pixel(&p, 3, 0, &strict), PixelVerdict::OutOfFrame);

    let far = pair(1, 4, 1, [0.6, 0.0]);
    assert_eq!(classify_pixel(&far, 3, 0, &config()), PixelVerdict::OutOfFrame);
}

#[test]
fn id_tolerance_absorbs_color_quantization() {
    let mut p = pair(1, 3, 3, [0.0, 0.0]);
    p.ids.set(1, 1, 0x10_20_30);
    p.next_ids.set(1, 1, 0x11_1f_30);
    assert_eq!(classify_pixel(&p, 1, 1, &config()), PixelVerdict::IdMismatch);

    let loose = SanityConfig {
        id_tolerance: 1,
        ..config()
    };
    assert_eq!(classify_pixel(&p, 1, 1, &loose), PixelVerdict::Sane);
    p.next_ids.set(1, 1, 0x12_20_30);
    assert_eq!(classify_pixel(&p, 1, 1, &loose), PixelVerdict::IdMismatch);
}

#[test]
fn reported_mismatches_are_capped_per_frame() {
    let p = pair(1, 8, 2, [10.0, 0.0]);
    let report = check_pairs(&[p], &config()).unwrap();
    assert_eq!(report.frames[0].out_of_frame, 16);
    assert_eq!(report.frames[0].mismatches.len(), MAX_REPORTED_MISMATCHES);
    assert_eq!(report.first_mismatches().len(), MAX_REPORTED_MISMATCHES);
}

#[test]
fn different_object_is_an_id_mismatch() {
    let mut p = pair(1, 3, 3, [0.0, 0.0]);
    p.next_ids.set(1, 1, 7);
    assert_eq!(classify_pixel(&p, 1, 1, &config()), PixelVerdict::IdMismatch);
    assert_eq!(classify_pixel(&p, 0, 0, &config()), PixelVerdict::Sane);
}

#[test]
fn correspondence_tolerance_is_per_channel() {
    let mut p = pair(1, 3, 3, [0.0, 0.0]);
    p.next_corresp.set(0, 0, [3.5, 0.0, 50.0]);
    p.next_corresp.set(1, 0, [10.0, 0.0, 60.0]);
    assert_eq!(classify_pixel(&p, 0, 0, &config()), PixelVerdict::Sane);
    assert_eq!(classify_pixel(&p, 1, 0, &config()), PixelVerdict::CorrespMismatch);
}

#[test]
fn occluded_pixels_are_excluded_from_the_score() {
    let mut p = pair(1, 2, 2, [0.0, 0.0]);
    p.occlusion = Plane::from_fn(2, 2, |_, _| 255);
    p.next_ids.set(0, 0, 9);
    assert_eq!(classify_pixel(&p, 0, 0, &config()), PixelVerdict::Occluded);
    assert_eq!(classify_pixel(&p, 1, 1, &config()), PixelVerdict::OccludedConsistent);

    let report = check_pairs(&[p], &config()).unwrap();
    assert_eq!(report.tested, 0);
    assert_eq!(report.occluded, 4);
    assert_eq!(report.score, 1.0);
    assert!(report.warnings.iter().any(|w| w.contains("score defaults to 1.0")));
}

#[test]
fn occlusion_fraction_above_limit_fails_the_check() {
    let mut p = pair(1, 2, 2, [0.0, 0.0]);
    p.occlusion.set(0, 0, 200);
    p.occlusion.set(1, 0, 200);
    let cfg = SanityConfig {
        max_occlusion_frac: Some(0.25),
        ..config()
    };
    let report = check_pairs(&[p], &cfg).unwrap();
    assert_eq!(report.score, 1.0);
    assert!(!report.passed);
    assert_eq!(report.flagged_frames(), vec![FrameIndex(1)]);
    assert!(report.summary_line().starts_with("sanity FAIL"));
}

#[test]
fn transparent_and_unlabelled_pixels_are_not_candidates() {
    let mut p = pair(1, 3, 1, [0.0, 0.0]);
    p.alpha.set(0, 0, 0);
    p.ids.set(1, 0, 0);
    assert_eq!(sample_pixels(&p, 100, 0), vec![(2, 0)]);
}

#[test]
fn frame_without_candidates_is_skipped_with_warning() {
    let mut empty = pair(1, 2, 2, [0.0, 0.0]);
    empty.alpha = Plane::from_fn(2, 2, |_, _| 0);
    let full = pair(2, 2, 2, [0.0, 0.0]);
    let report = check_pairs(&[empty, full], &config()).unwrap();
    assert_eq!(report.frames.len(), 1);
    assert_eq!(report.frames[0].frame, FrameIndex(2));
    assert!(report.warnings.iter().any(|w| w.contains("frame 000001")));
}

#[test]
fn pixel_sampling_is_seeded_and_sorted() {
    let p = pair(3, 20, 20, [0.0, 0.0]);
    let a = sample_pixels(&p, 25, 42);
    let b = sample_pixels(&p, 25, 42);
    assert_eq!(a, b);
    assert_eq!(a.len(), 25);
    let mut sorted = a.clone();
    sorted.sort_by_key(|&(x, y)| (y, x));
    assert_eq!(a, sorted);
    sorted.dedup();
    assert_eq!(sorted.len(), 25);
}

#[test]
fn evenly_spaced_selection_spans_the_sequence() {
    let testable: Vec<FrameIndex> = (1..=10).map(FrameIndex).collect();
    let cfg = SanityConfig {
        nframes: Some(3),
        ..SanityConfig::default()
    };
    assert_eq!(
        select_frames(&testable, &cfg),
        vec![FrameIndex(1), FrameIndex(4), FrameIndex(7)]
    );

    let all = SanityConfig {
        nframes: None,
        ..SanityConfig::default()
    };
    assert_eq!(select_frames(&testable, &all), testable);
}

#[test]
fn random_selection_depends_only_on_seed() {
    let testable: Vec<FrameIndex> = (0..50).map(FrameIndex).collect();
    let cfg = SanityConfig {
        nframes: Some(5),
        selection: FrameSelection::Random,
        seed: 7,
        ..SanityConfig::default()
    };
    let a = select_frames(&testable, &cfg);
    assert_eq!(a, select_frames(&testable, &cfg));
    assert_eq!(a.len(), 5);
    let mut unique = a.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);
}

#[test]
fn debug_frame_restricts_selection() {
    let testable: Vec<FrameIndex> = (1..=4).map(FrameIndex).collect();
    let cfg = SanityConfig {
        debug_frame: Some(FrameIndex(3)),
        ..SanityConfig::default()
    };
    assert_eq!(select_frames(&testable, &cfg), vec![FrameIndex(3)]);

    let missing = SanityConfig {
        debug_frame: Some(FrameIndex(9)),
        ..SanityConfig::default()
    };
    assert!(select_frames(&testable, &missing).is_empty());
}

#[test]
fn parallel_and_sequential_reports_match() {
    let pairs: Vec<FramePair> = (1..=6)
        .map(|i| {
            let mut p = pair(i, 16, 12, [1.0, 0.5]);
            p.next_ids.set(i, 2, 5);
            p
        })
        .collect();
    let seq = SanityConfig {
        npixels: 50,
        seed: 11,
        ..config()
    };
    let par = SanityConfig {
        threading: Threading {
            parallel: true,
            threads: Some(3),
        },
        ..seq.clone()
    };
    let a = check_pairs(&pairs, &seq).unwrap();
    let b = check_pairs(&pairs, &par).unwrap();
    assert_eq!(a.frames, b.frames);
    assert_eq!(a.score, b.score);
}

#[test]
fn validate_rejects_out_of_range_values() {
    let bad = [
        SanityConfig {
            npixels: 0,
            ..SanityConfig::default()
        },
        SanityConfig {
            nframes: Some(0),
            ..SanityConfig::default()
        },
        SanityConfig {
            min_sanity: 1.5,
            ..SanityConfig::default()
        },
        SanityConfig {
            max_occlusion_frac: Some(-0.1),
            ..SanityConfig::default()
        },
        SanityConfig {
            corresp_tolerance: f32::NAN,
            ..SanityConfig::default()
        },
        SanityConfig {
            border_margin_px: -1.0,
            ..SanityConfig::default()
        },
    ];
    for cfg in bad {
        assert!(matches!(cfg.validate(), Err(FlowError::Config(_))));
    }
    SanityConfig::default().validate().unwrap();
}

#[test]
fn mismatched_plane_sizes_are_rejected() {
    let mut p = pair(1, 3, 3, [0.0, 0.0]);
    p.ids = Plane::from_fn(2, 3, |_, _| 1);
    assert!(matches!(check_pairs(&[p], &config()), Err(FlowError::Decode(_))));
}
