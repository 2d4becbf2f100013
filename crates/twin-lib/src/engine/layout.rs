//! Deterministic 3D layout
//!
//! Non-hub hosts sit on a golden-angle spiral around the hub at the origin.
//! Offline hosts are pushed onto a wider ring so they read as detached.

use super::round_to;
use crate::models::{HostStatus, TwinPosition};

/// π(3 − √5), the golden angle in radians
pub const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Base ring radius for online and stale hosts
pub const BASE_RADIUS: f64 = 14.0;

/// Extra radius applied to offline hosts
pub const OFFLINE_RADIUS_OFFSET: f64 = 4.0;

/// Fraction of the radius used for the vertical spread
const ELEVATION_SCALE: f64 = 0.25;

/// Position of the `index`-th of `total` non-hub hosts
///
/// Pure in its arguments: the same (index, total, status) always lands on
/// the same point.
pub fn compute_position(index: usize, total: usize, status: HostStatus) -> TwinPosition {
    if total == 0 {
        return TwinPosition::ORIGIN;
    }

    let radius = match status {
        HostStatus::Offline => BASE_RADIUS + OFFLINE_RADIUS_OFFSET,
        HostStatus::Online | HostStatus::Stale => BASE_RADIUS,
    };

    let angle = index as f64 * GOLDEN_ANGLE;
    let normalized = if total > 1 {
        index as f64 / (total - 1) as f64
    } else {
        0.5
    };
    let elevation = (normalized - 0.5) * radius * ELEVATION_SCALE;
    let distance = radius + ((total + 1) as f64).ln();

    TwinPosition {
        x: round_to(angle.cos() * distance, 3),
        y: round_to(elevation, 3),
        z: round_to(angle.sin() * distance, 3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_golden_angle_constant() {
        let expected = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
        assert!((GOLDEN_ANGLE - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_layout_is_origin() {
        assert_eq!(compute_position(0, 0, HostStatus::Online), TwinPosition::ORIGIN);
    }

    #[test]
    fn test_single_host_sits_on_ring_at_mid_height() {
        let position = compute_position(0, 1, HostStatus::Online);
        let expected = round_to(BASE_RADIUS + 2.0_f64.ln(), 3);

        assert_eq!(position.x, expected);
        assert_eq!(position.y, 0.0);
        assert_eq!(position.z, 0.0);
    }

    #[test]
    fn test_elevation_spans_from_low_to_high() {
        let first = compute_position(0, 5, HostStatus::Online);
        let last = compute_position(4, 5, HostStatus::Online);

        assert_eq!(first.y, -1.75);
        assert_eq!(last.y, 1.75);
    }

    #[test]
    fn test_offline_hosts_use_wider_ring() {
        let online = compute_position(3, 8, HostStatus::Online);
        let offline = compute_position(3, 8, HostStatus::Offline);

        let online_r = (online.x.powi(2) + online.z.powi(2)).sqrt();
        let offline_r = (offline.x.powi(2) + offline.z.powi(2)).sqrt();
        assert!((offline_r - online_r - OFFLINE_RADIUS_OFFSET).abs() < 0.01);
    }

    #[test]
    fn test_layout_is_deterministic() {
        for total in 1..20 {
            for index in 0..total {
                assert_eq!(
                    compute_position(index, total, HostStatus::Stale),
                    compute_position(index, total, HostStatus::Stale)
                );
            }
        }
    }

    #[test]
    fn test_coordinates_rounded_to_three_decimals() {
        let position = compute_position(7, 13, HostStatus::Online);
        for value in [position.x, position.y, position.z] {
            assert_eq!(round_to(value, 3), value);
        }
    }
}
