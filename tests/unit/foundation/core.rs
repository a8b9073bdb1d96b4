use super::*;

#[test]
fn frame_name_formats_six_digits() {
    assert_eq!(FrameName::flow().format(FrameIndex(5)), "flow000005.flo");
    assert_eq!(
        FrameName::occlusions().format(FrameIndex(123456)),
        "occlusions123456.png"
    );
}

#[test]
fn frame_name_parse_roundtrips_format() {
    let name = FrameName::new("back_flow", "flo");
    let (parsed, frame) = FrameName::parse(&name.format(FrameIndex(42))).unwrap();
    assert_eq!(parsed, name);
    assert_eq!(frame, FrameIndex(42));
}

#[test]
fn frame_name_parse_accepts_other_padding() {
    let (name, frame) = FrameName::parse("metadata0017.exr").unwrap();
    assert_eq!(name.prefix, "metadata");
    assert_eq!(name.ext, "exr");
    assert_eq!(frame, FrameIndex(17));
}

#[test]
fn frame_name_parse_rejects_unconventional_names() {
    assert!(FrameName::parse("flow.flo").is_none());
    assert!(FrameName::parse("000001.flo").is_none());
    assert!(FrameName::parse("Flow000001.flo").is_none());
    assert!(FrameName::parse("flow0001a.flo").is_none());
    assert!(FrameName::parse("flow000001").is_none());
    assert!(FrameName::parse("flow000001.fl0").is_none());
}

#[test]
fn frame_of_reads_path_file_name() {
    let p = Path::new("/data/seq/ids/objectid000009.png");
    assert_eq!(FrameName::frame_of(p), Some(FrameIndex(9)));
}

#[test]
fn resolution_rejects_zero() {
    assert!(Resolution::new(0, 4).is_err());
    assert!(Resolution::new(4, 0).is_err());
    assert_eq!(Resolution::new(3, 2).unwrap().pixel_count(), 6);
}

#[test]
fn threading_rejects_zero_threads() {
    let t = Threading {
        parallel: true,
        threads: Some(0),
    };
    assert!(t.build_pool().is_err());
}

#[test]
fn last_representable_frame_has_no_next() {
    assert_eq!(FrameIndex(7).next(), Some(FrameIndex(8)));
    assert_eq!(FrameIndex(u32::MAX).next(), None);
    let (_, frame) = FrameName::parse("flow4294967295.flo").unwrap();
    assert_eq!(frame.next(), None);
}
