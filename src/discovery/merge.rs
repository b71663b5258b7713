use crate::models::GymCandidate;
use crate::utils::{haversine_miles, normalize_name};

/// Reports closer than this with the same name are the same gym
const MERGE_DISTANCE_MILES: f64 = 0.1;

/// Collapse reports of the same gym from different sources into one entry
pub fn merge_candidates(candidates: Vec<GymCandidate>) -> Vec<GymCandidate> {
    let mut merged: Vec<(String, GymCandidate)> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let key = normalize_name(&candidate.name);
        let existing = merged.iter_mut().find(|(name, gym)| {
            *name == key
                && haversine_miles(gym.latitude, gym.longitude, candidate.latitude, candidate.longitude)
                    <= MERGE_DISTANCE_MILES
        });

        match existing {
            Some((_, gym)) => gym.absorb(candidate),
            None => merged.push((key, candidate)),
        }
    }

    merged.into_iter().map(|(_, gym)| gym).collect()
}
