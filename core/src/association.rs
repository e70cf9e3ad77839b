//! Nearest-neighbor data association.
//!
//! Every observation is matched independently to the closest candidate landmark. There is no mutual
//! exclusivity: several observations may claim the same candidate. Ties go to the candidate that appears
//! first in the candidate list.
use crate::LandmarkObservation;
use crate::geometry::dist;

/// Associate each map-frame observation with its nearest candidate landmark.
///
/// # Arguments
/// * `predicted` - Candidate landmark positions in the map frame (typically the landmarks in sensor range).
/// * `observations` - Observations already transformed into the map frame.
///
/// # Returns
/// * `Some(matches)` with one entry per observation, in observation order. Each entry carries the matched
///   candidate's position and, as its id, the candidate's *index* within `predicted` (not the candidate's
///   own id). Use `predicted[m.id].id` to recover the landmark id.
/// * `None` if `predicted` is empty while `observations` is not, since there is no nearest neighbor to
///   report. With no observations the result is always `Some(vec![])`.
///
/// # Example
/// ```rust
/// use localizer::LandmarkObservation;
/// use localizer::association::associate;
/// let candidates = vec![LandmarkObservation::new(7, 0.0, 0.0), LandmarkObservation::new(9, 10.0, 10.0)];
/// let matches = associate(&candidates, &[LandmarkObservation::new(0, 1.0, 1.0)]).unwrap();
/// assert_eq!(matches[0].id, 0);
/// assert_eq!((matches[0].x, matches[0].y), (0.0, 0.0));
/// ```
pub fn associate(
    predicted: &[LandmarkObservation],
    observations: &[LandmarkObservation],
) -> Option<Vec<LandmarkObservation>> {
    if observations.is_empty() {
        return Some(Vec::new());
    }
    if predicted.is_empty() {
        return None;
    }
    let matches = observations
        .iter()
        .map(|obs| {
            let closest = nearest(predicted, obs);
            let candidate = &predicted[closest];
            LandmarkObservation::new(closest, candidate.x, candidate.y)
        })
        .collect();
    Some(matches)
}

/// Index of the candidate closest to `obs`. `predicted` must not be empty.
fn nearest(predicted: &[LandmarkObservation], obs: &LandmarkObservation) -> usize {
    let mut closest = 0;
    let mut closest_dist = f64::INFINITY;
    for (j, candidate) in predicted.iter().enumerate() {
        let d = dist(obs.x, obs.y, candidate.x, candidate.y);
        // strict comparison keeps the first of equally distant candidates
        if d < closest_dist {
            closest_dist = d;
            closest = j;
        }
    }
    closest
}
