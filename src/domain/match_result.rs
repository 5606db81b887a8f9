/// A single candidate returned by `CatalogBClient`, normalized into the
/// common shape the Matcher scores against. Mirrors the source's
/// `YouTubeResult` (id/url/title/author/artists/duration/verified/album/
/// explicit/views), generalized to "catalog B" so the core stays agnostic
/// of which search client produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogBResult {
    pub id: String,
    pub url: String,
    pub title: String,
    pub primary_author: String,
    pub artists: Vec<String>,
    pub duration_seconds: u32,
    /// True when the result is a "song"-typed / verified-artist result,
    /// as opposed to an arbitrary video upload.
    pub verified: bool,
    pub album: Option<String>,
    pub explicit: Option<bool>,
    pub views: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    pub result: CatalogBResult,
    pub score: f64,
}

/// Outcome of resolving one `CanonicalTrack` against catalog B.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchResult {
    Success {
        selected: ScoredCandidate,
        reason: String,
        /// Non-selected survivors within `CLOSE_MATCH_THRESHOLD` of the
        /// selected score (§4.5 step 7). Empty when the match is unambiguous.
        close_alternatives: Vec<ScoredCandidate>,
    },
    Failure {
        reason: String,
    },
}

impl MatchResult {
    pub fn success(
        selected: ScoredCandidate,
        reason: impl Into<String>,
        close_alternatives: Vec<ScoredCandidate>,
    ) -> Self {
        MatchResult::Success {
            selected,
            reason: reason.into(),
            close_alternatives,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        MatchResult::Failure {
            reason: reason.into(),
        }
    }

    pub fn has_close_alternatives(&self) -> bool {
        matches!(self, MatchResult::Success { close_alternatives, .. } if !close_alternatives.is_empty())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MatchResult::Success { .. })
    }
}
