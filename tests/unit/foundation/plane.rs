use super::*;

fn grid() -> Plane<[f32; 2]> {
    let xs = [
        [1.0, 5.0, 3.0, 7.0],
        [4.0, 2.0, -1.0, -1.0],
        [-2.0, 3.0, 5.0, 8.0],
    ];
    let ys = [
        [-1.0, -2.0, -3.0, 4.0],
        [0.0, 3.0, -5.0, -1.0],
        [1.0, 1.0, 1.0, 1.0],
    ];
    Plane::from_fn(4, 3, |x, y| {
        [xs[y as usize][x as usize], ys[y as usize][x as usize]]
    })
}

fn close(a: [f32; 2], b: [f32; 2]) -> bool {
    (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
}

fn px(p: &Plane<[f32; 2]>, x: u32, y: u32) -> [f32; 2] {
    *p.get(x, y).unwrap()
}

fn mix(a: [f32; 2], wa: f32, b: [f32; 2], wb: f32) -> [f32; 2] {
    [a[0] * wa + b[0] * wb, a[1] * wa + b[1] * wb]
}

#[test]
fn bilinear_matches_hand_computed_weights() {
    let p = grid();
    // row 0.3, col 2.6
    let top = mix(px(&p, 2, 0), 0.4, px(&p, 3, 0), 0.6);
    let bottom = mix(px(&p, 2, 1), 0.4, px(&p, 3, 1), 0.6);
    let expected = mix(top, 0.7, bottom, 0.3);
    assert!(close(p.sample_bilinear(2.6, 0.3).unwrap(), expected));

    // row 1.8, col 2.7
    let top = mix(px(&p, 2, 1), 0.3, px(&p, 3, 1), 0.7);
    let bottom = mix(px(&p, 2, 2), 0.3, px(&p, 3, 2), 0.7);
    let expected = mix(top, 0.2, bottom, 0.8);
    assert!(close(p.sample_bilinear(2.7, 1.8).unwrap(), expected));
}

#[test]
fn bilinear_at_integer_positions_returns_pixel() {
    let p = grid();
    assert!(close(p.sample_bilinear(3.0, 2.0).unwrap(), px(&p, 3, 2)));
    assert!(close(p.sample_bilinear(0.0, 0.0).unwrap(), px(&p, 0, 0)));
}

#[test]
fn bilinear_rejects_out_of_domain() {
    let p = grid();
    assert!(p.sample_bilinear(0.0, -1.0).is_none());
    assert!(p.sample_bilinear(-2.0, 1.0).is_none());
    assert!(p.sample_bilinear(0.0, 3.0).is_none());
    assert!(p.sample_bilinear(4.3, 1.5).is_none());
}

#[test]
fn distance_outside_is_zero_inside() {
    let p = grid();
    assert_eq!(p.distance_outside(1.5, 1.5), 0.0);
    assert!((p.distance_outside(4.0, 1.0) - 1.0).abs() < 1e-6);
    assert!((p.distance_outside(-3.0, -4.0) - 5.0).abs() < 1e-6);
}

#[test]
fn from_vec_checks_length() {
    assert!(Plane::from_vec(2, 2, vec![0u8; 3]).is_err());
    assert!(Plane::from_vec(2, 2, vec![0u8; 4]).is_ok());
}
