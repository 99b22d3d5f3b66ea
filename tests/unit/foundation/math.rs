use super::*;

#[test]
fn mul_div255_rounds_to_nearest() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(128, 255), 128);
    assert_eq!(mul_div255_u16(0, 200), 0);
}

#[test]
fn hash3_is_stable_and_bounded() {
    for x in -4..4 {
        for y in -4..4 {
            let a = hash3(x, y, 7);
            assert_eq!(a.to_bits(), hash3(x, y, 7).to_bits());
            assert!((0.0..=1.0).contains(&a));
        }
    }
    assert_ne!(hash3(1, 2, 3), hash3(2, 1, 3));
}

#[test]
fn value_noise_matches_lattice_at_integer_points() {
    let v = value_noise(3.0, -2.0, 11);
    assert_eq!(v.to_bits(), hash3(3, -2, 11).to_bits());
    let mid = value_noise(3.5, -1.5, 11);
    assert!((0.0..=1.0).contains(&mid));
}

#[test]
fn smoothstep_clamps() {
    assert_eq!(smoothstep(0.25, 0.75, 0.0), 0.0);
    assert_eq!(smoothstep(0.25, 0.75, 1.0), 1.0);
    assert!((smoothstep(0.25, 0.75, 0.5) - 0.5).abs() < 1e-6);
}

#[test]
fn unit_to_u8_saturates() {
    assert_eq!(unit_to_u8(-1.0), 0);
    assert_eq!(unit_to_u8(2.0), 255);
    assert_eq!(unit_to_u8(0.5), 128);
}
