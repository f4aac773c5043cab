//! Tag remapping applied when scoring predictions.

/// Remap a tag for scoring.
///
/// Chemical spans score as drug spans and the model's null class scores
/// as `O`; every other tag passes through unchanged. The mapping is total
/// and idempotent. Note that the lowercase `None` null class is distinct
/// from the uppercase `NONE` padding sentinel, which is excluded from
/// scored sequences before this function applies.
pub fn remap_for_scoring(tag: &str) -> &str {
    match tag {
        "B-Chemical" => "B-Drug",
        "I-Chemical" => "I-Drug",
        "None" => "O",
        other => other,
    }
}
