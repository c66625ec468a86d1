//! Collision resolution: pick exactly one candidate for a shared title key.
//!
//! Total and deterministic — "ambiguous" is never an answer. Each stage
//! narrows the set only when doing so leaves at least one candidate, so a
//! hint that matches nothing is ignored rather than fatal. The cascade
//! favors precision: when in doubt, prefer the entry most likely to be the
//! main work over a special or recap sharing its title.

use crate::index::{MediaType, ReferenceEntry};

/// Year filter tolerance for the fallback stage.
const YEAR_TOLERANCE: i32 = 1;

/// Resolve a non-empty candidate list to a single MAL id.
///
/// Stages:
/// 1. exact release-year match, falling back to ±1 tolerance;
/// 2. media-type match;
/// 3. highest cross-catalog link count (popularity proxy);
/// 4. first-seen corpus order.
///
/// The final tie-break is a known precision limit, not an error: two
/// entries identical on year, type and link count resolve to whichever the
/// corpus listed first.
pub fn resolve(
    candidates: &[ReferenceEntry],
    year: Option<i32>,
    media_type: Option<MediaType>,
) -> u32 {
    debug_assert!(!candidates.is_empty());
    let mut remaining: Vec<&ReferenceEntry> = candidates.iter().collect();

    if let Some(year) = year {
        narrow(&mut remaining, |c| c.year == Some(year));
        narrow(&mut remaining, |c| {
            c.year
                .is_some_and(|cy| (cy - year).abs() <= YEAR_TOLERANCE)
        });
    }

    if let Some(media_type) = media_type {
        narrow(&mut remaining, |c| c.media_type == media_type);
    }

    // Strictly-greater comparison keeps the first-seen entry on ties.
    let mut best = remaining[0];
    for candidate in &remaining[1..] {
        if candidate.alias_count > best.alias_count {
            best = candidate;
        }
    }
    best.mal_id
}

/// Apply a filter only if it keeps at least one candidate.
fn narrow<'a>(
    remaining: &mut Vec<&'a ReferenceEntry>,
    keep: impl Fn(&ReferenceEntry) -> bool,
) {
    if remaining.iter().any(|c| keep(c)) {
        remaining.retain(|c| keep(c));
    }
}
