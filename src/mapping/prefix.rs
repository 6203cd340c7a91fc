use percent_encoding::percent_decode_str;

// ---------------------------------------------------------------------------
// Request prefix normalization
// ---------------------------------------------------------------------------

/// Turn the path remainder after the map prefix into a logical prefix:
/// percent-decoded, leading slashes trimmed.
pub fn normalize_request_prefix(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    decoded.trim_start_matches('/').to_string()
}

/// Strip the first occurrence of `map_prefix` from the start of `path`.
///
/// Returns `None` if `path` is not routed to the map endpoint.
pub fn strip_map_prefix<'a>(path: &'a str, map_prefix: &str) -> Option<&'a str> {
    path.strip_prefix(map_prefix)
}

// ---------------------------------------------------------------------------
// Prefix fan-out
// ---------------------------------------------------------------------------

/// Last `/`-separated segment of a prefix. Empty if it ends with `/`.
pub fn last_segment(prefix: &str) -> &str {
    prefix.rsplit('/').next().unwrap_or(prefix)
}

/// Join two path fragments with exactly one `/`, dropping empty fragments and
/// collapsing repeated slashes. A leading slash on `base` is kept.
pub fn join_path(base: &str, segment: &str) -> String {
    let rooted = base.starts_with('/');
    let parts: Vec<&str> = base
        .split('/')
        .chain(segment.split('/'))
        .filter(|p| !p.is_empty())
        .collect();
    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Physical prefixes to list for one logical prefix.
///
/// The logical prefix comes first, followed by each alternate location joined
/// with the logical prefix's last segment, in configuration order. Results are
/// concatenated in this order, so no deduplication happens here.
pub fn physical_prefixes(prefix: &str, extra_prefixes: &[String]) -> Vec<String> {
    let last = last_segment(prefix);
    std::iter::once(prefix.to_string())
        .chain(extra_prefixes.iter().map(|alt| join_path(alt, last)))
        .collect()
}
