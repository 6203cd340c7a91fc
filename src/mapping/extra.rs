use crate::core::types::{Clip, Manifest, Sequence};

/// First value of query parameter `name` in a raw query string.
///
/// Values are form-decoded (`%2C` and `+` included). A parameter present with
/// an empty value yields `Some("")`.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Append one single-clip sequence per comma-separated token in `raw`.
///
/// Tokens are taken verbatim, never filtered or signed. Empty tokens are
/// skipped, so `a,,b` adds two sequences. Returns how many were appended.
pub fn append_extra_resources(manifest: &mut Manifest, raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return 0;
    };
    let before = manifest.len();
    for token in raw.split(',').filter(|t| !t.is_empty()) {
        manifest.push(Sequence::single(Clip::opaque(token)));
    }
    manifest.len() - before
}
