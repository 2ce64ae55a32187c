use std::collections::HashSet;

use crate::ai::wire::GroundingMetadata;
use crate::state::Citation;

/// Reduces raw grounding metadata to the citations worth rendering.
///
/// Only chunks carrying a web source with a non-empty uri survive. The first
/// occurrence of each uri wins and arrival order is kept. Returns `None`
/// rather than an empty list so renderers can tell "no grounding" apart.
pub fn extract_citations(metadata: Option<&GroundingMetadata>) -> Option<Vec<Citation>> {
    let chunks = metadata?.grounding_chunks.as_deref()?;
    let mut seen: HashSet<&str> = HashSet::new();

    let citations: Vec<Citation> = chunks
        .iter()
        .filter_map(|chunk| chunk.web.as_ref())
        .filter_map(|web| {
            let uri = web.uri.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
            seen.insert(uri).then(|| Citation {
                uri: uri.to_string(),
                title: web
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            })
        })
        .collect();

    (!citations.is_empty()).then_some(citations)
}
