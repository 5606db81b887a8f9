use strsim::normalized_levenshtein;

use crate::catalog::CatalogBClient;
use crate::domain::canonical_track::CanonicalTrack;
use crate::domain::match_result::{CatalogBResult, MatchResult, ScoredCandidate};
use crate::utils::normalizations::normalize_name;

use super::{CLOSE_MATCH_THRESHOLD, DURATION_TOLERANCE_SECONDS, MATCH_ACCEPTANCE_FLOOR};

const TITLE_WEIGHT: f64 = 45.0;
const ARTIST_WEIGHT: f64 = 35.0;
const DURATION_WEIGHT: f64 = 15.0;
const VERIFIED_BOOST: f64 = 5.0;

/// Deltas up to this many seconds score full duration marks; only the
/// remainder of `DURATION_TOLERANCE_SECONDS` tapers linearly to zero. Without
/// this grace band a harmless ±1s rounding difference costs as many points as
/// the verified boost, which can push a near-identical candidate outside
/// `CLOSE_MATCH_THRESHOLD` (§8 P7).
const DURATION_GRACE_SECONDS: i64 = 1;

/// §4.5: resolve one `CanonicalTrack` against catalog B. Tries ISRC first,
/// falls back to a free-text query when ISRC search is empty or absent.
pub async fn resolve<C: CatalogBClient>(
    track: &CanonicalTrack,
    catalog_b: &C,
) -> Result<MatchResult, crate::catalog::CatalogBError> {
    let mut candidates = Vec::new();
    if let Some(isrc) = &track.metadata.isrc {
        candidates = catalog_b.search_by_isrc(isrc).await?;
    }

    if candidates.is_empty() {
        let query = format!("{} - {}", track.metadata.primary_artist, track.metadata.name);
        candidates = catalog_b.search_by_query(&query).await?;
    }

    Ok(score_and_select(track, candidates))
}

fn score_and_select(track: &CanonicalTrack, candidates: Vec<CatalogBResult>) -> MatchResult {
    let target_duration = track.metadata.duration_seconds() as i64;

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter(|candidate| {
            (candidate.duration_seconds as i64 - target_duration).abs() <= DURATION_TOLERANCE_SECONDS
        })
        .map(|candidate| {
            let score = score_candidate(track, &candidate, target_duration);
            ScoredCandidate { result: candidate, score }
        })
        .filter(|scored| scored.score >= MATCH_ACCEPTANCE_FLOOR)
        .collect();

    if scored.is_empty() {
        return MatchResult::failure("no candidate cleared the acceptance floor within duration tolerance");
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let selected = scored.remove(0);

    let close_alternatives: Vec<ScoredCandidate> = scored
        .into_iter()
        .filter(|candidate| (selected.score - candidate.score).abs() <= CLOSE_MATCH_THRESHOLD)
        .collect();

    MatchResult::success(selected, "highest-scoring candidate within tolerance", close_alternatives)
}

fn score_candidate(track: &CanonicalTrack, candidate: &CatalogBResult, target_duration: i64) -> f64 {
    let title_similarity =
        normalized_levenshtein(&normalize_name(&candidate.title), &normalize_name(&track.metadata.name));

    let artist_similarity = best_artist_similarity(track, candidate);

    let delta = (candidate.duration_seconds as i64 - target_duration).abs();
    let taper_span = (DURATION_TOLERANCE_SECONDS - DURATION_GRACE_SECONDS).max(1) as f64;
    let duration_closeness = if delta <= DURATION_GRACE_SECONDS {
        1.0
    } else {
        (1.0 - ((delta - DURATION_GRACE_SECONDS) as f64 / taper_span)).max(0.0)
    };

    let verified_boost = if candidate.verified { VERIFIED_BOOST } else { 0.0 };
    let views_bonus = candidate.views.map(|v| ((v + 1) as f64).log10() * 0.5).unwrap_or(0.0);

    title_similarity * TITLE_WEIGHT
        + artist_similarity * ARTIST_WEIGHT
        + duration_closeness * DURATION_WEIGHT
        + verified_boost
        + views_bonus
}

/// Best-of token-set ratio across the cartesian product of both artist lists.
fn best_artist_similarity(track: &CanonicalTrack, candidate: &CatalogBResult) -> f64 {
    let mut target_artists = vec![track.metadata.primary_artist.clone()];
    target_artists.extend(track.metadata.artists.iter().cloned());

    let mut candidate_artists = vec![candidate.primary_author.clone()];
    candidate_artists.extend(candidate.artists.iter().cloned());

    target_artists
        .iter()
        .flat_map(|target| {
            candidate_artists
                .iter()
                .map(move |candidate| normalized_levenshtein(&normalize_name(target), &normalize_name(candidate)))
        })
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canonical_track::CanonicalTrackMetadata;
    use chrono::Utc;

    fn track(name: &str, artist: &str, duration_ms: u32) -> CanonicalTrack {
        CanonicalTrack {
            id: 1,
            external_id: "ext1".to_string(),
            metadata: CanonicalTrackMetadata::new(name, artist, vec![artist.to_string()], duration_ms).unwrap(),
            resolution: crate::domain::canonical_track::Resolution::Unresolved,
            match_at: None,
            acquired: false,
            acquired_at: None,
            file_path: None,
            lyrics_attempted: false,
            lyrics_text: None,
            lyrics_synced: false,
            lyrics_source: None,
            metadata_embedded: false,
            lyrics_embedded: false,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    fn candidate(id: &str, title: &str, artist: &str, duration_seconds: u32, verified: bool) -> CatalogBResult {
        CatalogBResult {
            id: id.to_string(),
            url: format!("https://example/{id}"),
            title: title.to_string(),
            primary_author: artist.to_string(),
            artists: vec![artist.to_string()],
            duration_seconds,
            verified,
            album: None,
            explicit: None,
            views: None,
        }
    }

    #[test]
    fn selects_the_exact_match_when_present() {
        let t = track("Song", "Artist", 200_000);
        let candidates = vec![
            candidate("v1", "Song", "Artist", 200, true),
            candidate("v2", "Totally Unrelated", "Nobody", 400, false),
        ];

        match score_and_select(&t, candidates) {
            MatchResult::Success { selected, .. } => assert_eq!(selected.result.id, "v1"),
            MatchResult::Failure { reason } => panic!("expected success, got failure: {reason}"),
        }
    }

    #[test]
    fn rejects_candidates_outside_duration_tolerance() {
        let t = track("Song", "Artist", 200_000);
        let candidates = vec![candidate("v1", "Song", "Artist", 400, true)];

        let result = score_and_select(&t, candidates);
        assert!(!result.is_success());
    }

    #[test]
    fn close_scores_surface_as_alternatives() {
        // v1: 45 (title) + 35 (artist) + 15 (duration, within grace) + 5 (verified) = 100.0
        // v2: 45 (title) + 35 (artist) + 15 (duration, still within grace at delta=1) = 95.0
        // Gap is exactly the verified boost (5.0), which sits at CLOSE_MATCH_THRESHOLD.
        let t = track("Song", "Artist", 200_000);
        let candidates = vec![
            candidate("v1", "Song", "Artist", 200, true),
            candidate("v2", "Song", "Artist", 201, false),
        ];

        match score_and_select(&t, candidates) {
            MatchResult::Success { selected, close_alternatives, .. } => {
                assert_eq!(selected.result.id, "v1");
                assert!(!close_alternatives.is_empty(), "near-identical candidate should be a close alternative");
                assert_eq!(close_alternatives[0].result.id, "v2");
            }
            MatchResult::Failure { reason } => panic!("expected success, got failure: {reason}"),
        }
    }

    #[test]
    fn duration_grace_band_gives_full_marks_within_one_second() {
        let t = track("Song", "Artist", 200_000);
        let exact = candidate("v1", "Song", "Artist", 200, false);
        let one_off = candidate("v2", "Song", "Artist", 201, false);

        assert_eq!(score_candidate(&t, &exact, 200), score_candidate(&t, &one_off, 200));
    }
}
