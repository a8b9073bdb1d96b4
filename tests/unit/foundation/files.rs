use super::*;

#[test]
fn glob_frames_keys_by_frame_number() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["flow000003.flo", "flow000001.flo", "notes.flo"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let pattern = format!("{}/*.flo", dir.path().display());
    let frames = glob_frames(&pattern).unwrap();
    assert_eq!(
        frames.keys().copied().collect::<Vec<_>>(),
        vec![FrameIndex(1), FrameIndex(3)]
    );
}

#[test]
fn glob_without_matches_is_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = format!("{}/*.png", dir.path().display());
    assert!(matches!(glob_frames(&pattern), Err(FlowError::Input(_))));
}

#[test]
fn sorted_files_skips_directories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("b000002.exr"), b"").unwrap();
    std::fs::write(dir.path().join("b000001.exr"), b"").unwrap();
    let files = sorted_files(dir.path()).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("b000001.exr"));
}
