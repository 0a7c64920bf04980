//! Nearest-obstacle evaluator.

use crate::types::{NearestResult, TrackedObject, WorldSnapshot};
use nalgebra::{distance, Point2};

/// Finds the obstacle closest to the robot in a snapshot.
///
/// Pure function of the snapshot. On exact distance ties the object that
/// appears first in the list wins. No objects → `NearestResult::none()`.
pub fn evaluate(snapshot: &WorldSnapshot) -> NearestResult {
    nearest_to(&snapshot.pose.position, &snapshot.objects)
}

/// Nearest object to an arbitrary point, with the same tie-break rule.
pub fn nearest_to(origin: &Point2<f64>, objects: &[TrackedObject]) -> NearestResult {
    let mut best: Option<(usize, f64)> = None;

    for (idx, obj) in objects.iter().enumerate() {
        let d = distance(origin, &obj.position);
        if d.is_nan() {
            continue;
        }

        // Strict comparison keeps the earliest object on ties
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }

    match best {
        Some((idx, d)) => NearestResult {
            object_id: Some(objects[idx].id.clone()),
            index: Some(idx),
            distance: Some(d),
        },
        None => NearestResult::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectId, Pose};
    use approx::assert_relative_eq;

    fn snapshot(robot: (f64, f64), objects: Vec<TrackedObject>) -> WorldSnapshot {
        WorldSnapshot {
            timestamp: 0,
            pose: Pose::new(0, robot.0, robot.1, 0.0),
            objects,
        }
    }

    #[test]
    fn test_single_object() {
        let result = evaluate(&snapshot((0.0, 0.0), vec![TrackedObject::new("a", 3.0, 4.0)]));

        assert_eq!(result.object_id, Some(ObjectId::from("a")));
        assert_eq!(result.index, Some(0));
        assert_relative_eq!(result.distance.unwrap(), 5.0);
    }

    #[test]
    fn test_picks_minimum() {
        let result = evaluate(&snapshot(
            (1.0, 0.0),
            vec![
                TrackedObject::new("far", 10.0, 0.0),
                TrackedObject::new("near", 1.0, 2.0),
                TrackedObject::new("mid", -3.0, 0.0),
            ],
        ));

        assert_eq!(result.object_id, Some(ObjectId::from("near")));
        assert_eq!(result.index, Some(1));
        assert_relative_eq!(result.distance.unwrap(), 2.0);
    }

    #[test]
    fn test_tie_goes_to_earliest() {
        let objects = vec![
            TrackedObject::new("x", 5.0, 0.0),
            TrackedObject::new("left", -2.0, 0.0),
            TrackedObject::new("right", 2.0, 0.0),
        ];
        let result = evaluate(&snapshot((0.0, 0.0), objects));

        assert_eq!(result.object_id, Some(ObjectId::from("left")));
        assert_eq!(result.index, Some(1));
    }

    #[test]
    fn test_empty_objects_is_none() {
        let result = evaluate(&snapshot((2.0, 2.0), vec![]));
        assert!(result.is_none());
        assert_eq!(result, NearestResult::none());
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let snap = snapshot(
            (0.5, -0.5),
            vec![TrackedObject::new("a", 1.0, 1.0), TrackedObject::new("b", -1.0, 1.0)],
        );

        let first = evaluate(&snap);
        for _ in 0..5 {
            assert_eq!(evaluate(&snap), first);
        }
    }

    #[test]
    fn test_object_on_robot_is_zero_distance() {
        let result = evaluate(&snapshot((1.0, 1.0), vec![TrackedObject::new("a", 1.0, 1.0)]));
        assert_eq!(result.distance, Some(0.0));
    }
}
