//! Episode specification expansion (`1,3,5-7`)

use crate::error::ParseError;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Longest range accepted from a single `a-b` token
const MAX_RANGE_LEN: u32 = 5000;

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // literal pattern
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(\d+)\s*-\s*(\d+)$").unwrap()
});

/// Expand an episode specification into ascending, deduplicated episode numbers.
///
/// Accepts single integers, comma-separated lists and inclusive `a-b` ranges in
/// any combination. Malformed tokens (non-numeric, reversed or oversized ranges,
/// episode 0) are dropped; an empty result is an error rather than "no episodes".
///
/// ```
/// use anime_relay::command::expand_episodes;
///
/// assert_eq!(expand_episodes("1,3,5-7,3").unwrap(), vec![1, 3, 5, 6, 7]);
/// assert!(expand_episodes("x,y").is_err());
/// ```
pub fn expand_episodes(spec: &str) -> Result<Vec<u32>, ParseError> {
    let mut episodes = BTreeSet::new();

    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Ok(single) = token.parse::<u32>() {
            if single > 0 {
                episodes.insert(single);
            }
            continue;
        }

        let Some(caps) = RANGE_RE.captures(token) else {
            tracing::debug!(token, "dropping malformed episode token");
            continue;
        };
        let (Ok(start), Ok(end)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            tracing::debug!(token, "dropping out-of-range episode token");
            continue;
        };
        if start == 0 || start > end || end - start >= MAX_RANGE_LEN {
            tracing::debug!(token, start, end, "dropping unusable episode range");
            continue;
        }
        episodes.extend(start..=end);
    }

    if episodes.is_empty() {
        return Err(ParseError::EmptyEpisodes(spec.to_string()));
    }
    Ok(episodes.into_iter().collect())
}
