//! Geofence point-in-polygon tests

use crate::snapshot::GeoFence;
use crate::OUTSIDE_SAFE_ZONES;

/// Ray-casting point-in-polygon test.
///
/// Vertices on an edge count as inside, which errs toward keeping a person
/// "in zone" at fence boundaries.
pub fn point_in_polygon(point: (f64, f64), polygon: &[(f64, f64)]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let (x, y) = point;
    let mut inside = false;

    let n = polygon.len();
    let (mut p1x, mut p1y) = polygon[0];
    for i in 1..=n {
        let (p2x, p2y) = polygon[i % n];
        if y > p1y.min(p2y) && y <= p1y.max(p2y) && x <= p1x.max(p2x) {
            let crosses = if (p1y - p2y).abs() < f64::EPSILON {
                true
            } else {
                let x_intersect = (y - p1y) * (p2x - p1x) / (p2y - p1y) + p1x;
                p1x == p2x || x <= x_intersect
            };
            if crosses {
                inside = !inside;
            }
        }
        p1x = p2x;
        p1y = p2y;
    }

    inside
}

/// Resolve a tracked position to a zone id.
pub fn zone_for_point(point: (f64, f64), fences: &[GeoFence]) -> String {
    for fence in fences {
        if point_in_polygon(point, &fence.polygon) {
            return fence.zone_id.clone();
        }
    }
    OUTSIDE_SAFE_ZONES.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn square() -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]
    }

    #[test]
    fn test_point_inside_square() {
        assert!(point_in_polygon((1.0, 1.0), &square()));
    }

    #[test]
    fn test_point_outside_square() {
        assert!(!point_in_polygon((3.0, 1.0), &square()));
        assert!(!point_in_polygon((-0.5, 0.5), &square()));
    }

    #[test]
    fn test_degenerate_polygon_is_outside() {
        assert!(!point_in_polygon((0.0, 0.0), &[(1.0, 1.0), (2.0, 2.0)]));
    }

    #[test]
    fn test_zone_resolution_falls_back_to_outside() {
        let fences = vec![GeoFence {
            zone_id: "living_room".to_string(),
            polygon: square(),
            risk_level: 1,
            allowed_devices: BTreeSet::new(),
        }];

        assert_eq!(zone_for_point((1.0, 1.0), &fences), "living_room");
        assert_eq!(zone_for_point((9.0, 9.0), &fences), OUTSIDE_SAFE_ZONES);
    }
}
