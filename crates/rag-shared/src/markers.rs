use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Matches open and close markers: `<<<12>>>` / `<<</12>>>`.
static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<</?(\d+)>>>").expect("valid regex"));

/// Wraps a db chunk's content in its provenance markers.
pub fn wrap(id: i64, content: &str) -> String {
    format!("<<<{id}>>>{content}<<</{id}>>>")
}

/// Removes every `<<<n>>>` / `<<</n>>>` marker.
pub fn strip(text: &str) -> String {
    MARKER_RE.replace_all(text, "").into_owned()
}

/// Sorted, deduplicated marker ids found in `text`.
pub fn marker_ids(text: &str) -> Vec<i64> {
    let ids: BTreeSet<i64> = MARKER_RE
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse().ok())
        .collect();
    ids.into_iter().collect()
}
