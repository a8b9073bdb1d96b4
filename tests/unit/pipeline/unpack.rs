use super::*;
use crate::archive::frames::FrameArchive;
use crate::flow::field::read_flo;

const W: u32 = 3;
const H: u32 = 2;

/// Four-channel motion pass with uniform forward/backward flow, one background pixel.
fn buffer(forward: [f32; 2], backward: [f32; 2], depth: f32) -> MetaBuffer {
    let n = (W * H) as usize;
    let fill = |v: f32| vec![v; n];
    let mut depths = fill(depth);
    let mut alpha = fill(1.0);
    depths[n - 1] = 1e10;
    alpha[n - 1] = 0.0;
    MetaBuffer::new(W, H)
        .with_channel("RenderLayer.Vector.X", fill(backward[0]))
        .unwrap()
        .with_channel("RenderLayer.Vector.Y", fill(-backward[1]))
        .unwrap()
        .with_channel("RenderLayer.Vector.Z", fill(-forward[0]))
        .unwrap()
        .with_channel("RenderLayer.Vector.W", fill(forward[1]))
        .unwrap()
        .with_channel("RenderLayer.Depth.Z", depths)
        .unwrap()
        .with_channel("RenderLayer.Combined.A", alpha)
        .unwrap()
}

fn full_config(root: &Path) -> UnpackConfig {
    UnpackConfig {
        input_dir: root.join("exr"),
        flow_odir: Some(root.join("flow")),
        back_flow_odir: Some(root.join("backflow")),
        depth_odir: Some(root.join("depth")),
        occlusions_odir: Some(root.join("occlusions")),
        depth_range_ofile: Some(root.join("depth_range.txt")),
        flow_zip: Some(root.join("flow.zip")),
        back_flow_zip: Some(root.join("backflow.zip")),
        depth_zip: Some(root.join("depth.zip")),
        ..UnpackConfig::default()
    }
}

#[test]
fn three_frames_produce_every_output() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut u = SequenceUnpacker::new(full_config(root)).unwrap();
    for i in 1..=3u32 {
        u.push(FrameIndex(i), &buffer([0.0, 0.0], [0.0, 0.0], i as f32 * 2.0))
            .unwrap();
    }
    let summary = u.finish().unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.flows, 2);
    assert_eq!(summary.back_flows, 2);
    assert_eq!(summary.depths, 3);
    assert_eq!(summary.occlusions, 2);
    assert_eq!(summary.depth_range, Some(DepthRange { min: 2.0, max: 6.0 }));
    assert_eq!(summary.archives.len(), 3);

    assert!(root.join("flow/flow000002.flo").is_file());
    assert!(!root.join("flow/flow000003.flo").exists());
    assert!(!root.join("backflow/backflow000001.flo").exists());
    assert!(root.join("backflow/backflow000003.flo").is_file());
    assert!(root.join("depth/depth000003.array").is_file());

    let occ = image::open(root.join("occlusions/occlusions000001.png"))
        .unwrap()
        .to_luma8();
    assert!(occ.pixels().all(|p| p.0[0] == 0));

    let text = std::fs::read_to_string(root.join("depth_range.txt")).unwrap();
    assert_eq!(text, "2.000000 6.000000\n2 3 2\n");

    let ar = FrameArchive::open(&root.join("depth.zip")).unwrap();
    assert_eq!(ar.frames(), &[FrameIndex(1), FrameIndex(2), FrameIndex(3)]);
}

#[test]
fn forward_flow_is_written_in_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = UnpackConfig {
        flow_odir: Some(dir.path().join("flow")),
        units: MotionUnits::Normalized,
        ..UnpackConfig::default()
    };
    let mut u = SequenceUnpacker::new(cfg).unwrap();
    u.push(FrameIndex(0), &buffer([0.5, -1.0], [0.0, 0.0], 1.0)).unwrap();
    u.push(FrameIndex(1), &buffer([0.0, 0.0], [0.0, 0.0], 1.0)).unwrap();
    u.finish().unwrap();

    let flow = read_flo(&dir.path().join("flow/flow000000.flo")).unwrap();
    assert_eq!(flow.data[0], [0.75, -1.0]);
}

#[test]
fn frames_must_be_consecutive() {
    let dir = tempfile::tempdir().unwrap();
    let mut u = SequenceUnpacker::new(full_config(dir.path())).unwrap();
    u.push(FrameIndex(1), &buffer([0.0, 0.0], [0.0, 0.0], 1.0)).unwrap();
    let err = u
        .push(FrameIndex(3), &buffer([0.0, 0.0], [0.0, 0.0], 1.0))
        .unwrap_err();
    assert!(matches!(err, FlowError::Input(_)));
}

#[test]
fn archive_without_its_directory_is_a_config_error() {
    let cfg = UnpackConfig {
        depth_zip: Some(PathBuf::from("depth.zip")),
        ..UnpackConfig::default()
    };
    assert!(matches!(
        SequenceUnpacker::new(cfg),
        Err(FlowError::Config(_))
    ));
}

#[test]
fn all_background_depth_cannot_give_a_range() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = UnpackConfig {
        depth_range_ofile: Some(dir.path().join("range.txt")),
        ..UnpackConfig::default()
    };
    let mut u = SequenceUnpacker::new(cfg).unwrap();
    u.push(FrameIndex(0), &buffer([0.0, 0.0], [0.0, 0.0], 1e10)).unwrap();
    assert!(matches!(u.finish(), Err(FlowError::Decode(_))));
}

#[test]
fn resolution_change_names_the_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut u = SequenceUnpacker::new(full_config(dir.path())).unwrap();
    u.push(FrameIndex(1), &buffer([0.0, 0.0], [0.0, 0.0], 1.0)).unwrap();
    let small = MetaBuffer::new(1, 1)
        .with_channel("Vector.X", vec![0.0])
        .unwrap()
        .with_channel("Vector.Y", vec![0.0])
        .unwrap();
    let err = u.push(FrameIndex(2), &small).unwrap_err().to_string();
    assert!(err.contains("frame 000002"), "{err}");
}

#[test]
fn empty_input_dir_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    let cfg = UnpackConfig {
        input_dir: dir.path().to_path_buf(),
        ..UnpackConfig::default()
    };
    assert!(matches!(unpack_sequence(cfg), Err(FlowError::Input(_))));
}

#[test]
fn nothing_follows_the_last_representable_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut u = SequenceUnpacker::new(full_config(dir.path())).unwrap();
    u.push(FrameIndex(u32::MAX), &buffer([0.0, 0.0], [0.0, 0.0], 1.0))
        .unwrap();
    let err = u
        .push(FrameIndex(0), &buffer([0.0, 0.0], [0.0, 0.0], 1.0))
        .unwrap_err();
    assert!(matches!(err, FlowError::Input(_)));
}
