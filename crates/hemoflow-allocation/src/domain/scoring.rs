//! Location scoring and stock selection.
//!
//! A request's location is a `_`-delimited hierarchy
//! (`province_district_ward`); inventory locations are free text. The
//! score counts how many hierarchy tokens appear in the inventory
//! location, compared case- and whitespace-insensitively.

use crate::domain::entities::BloodInventory;

/// Lowercases and strips all whitespace, so "Dong Da" matches "dongda".
fn normalize(raw: &str) -> String {
    raw.to_lowercase().split_whitespace().collect()
}

/// Scores an inventory location against a request location.
///
/// Each non-empty `_`-delimited token of `request_location` contributes 1
/// when it occurs as a substring of the normalized inventory location.
/// An empty request location scores 0 against every candidate.
pub fn location_score(request_location: &str, inventory_location: &str) -> u32 {
    let haystack = normalize(inventory_location);
    request_location
        .split('_')
        .filter(|token| !token.is_empty())
        .filter(|token| haystack.contains(&normalize(token)))
        .count() as u32
}

/// Picks the candidate that best serves a request at `request_location`.
///
/// Highest score wins. Equal scores prefer the oldest `last_updated`
/// (FIFO stock rotation). Full ties keep the earliest candidate in
/// repository order, which is also where selection lands when nothing
/// scores above 0; candidates are never filtered on score.
pub fn pick_best_stocked<'a>(
    request_location: &str,
    candidates: &'a [BloodInventory],
) -> Option<&'a BloodInventory> {
    let mut best: Option<(&BloodInventory, u32)> = None;
    for candidate in candidates {
        let score = location_score(request_location, &candidate.location);
        let replaces = match best {
            None => true,
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score && candidate.last_updated < current.last_updated)
            }
        };
        if replaces {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}
