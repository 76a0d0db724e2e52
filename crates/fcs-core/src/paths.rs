//! Path template helpers (`/accounts/{AccountId}/balances`).

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z0-9_\-]+)\}").unwrap();
}

/// Replace `{Key}` placeholders from `ids` in one pass. Unknown keys
/// become `${Key}` context references, resolved when the case runs
/// (e.g. a `ConsentId` captured by an earlier case).
pub fn substitute_resource_ids(path: &str, ids: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(path, |caps: &Captures<'_>| match ids.get(&caps[1]) {
            Some(id) => id.clone(),
            None => format!("${{{}}}", &caps[1]),
        })
        .into_owned()
}

/// Whether a concrete path matches a template segment by segment; a
/// `{Param}` segment matches any non-empty segment.
pub fn matches_template(template: &str, path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    let t: Vec<_> = template.trim_end_matches('/').split('/').collect();
    let p: Vec<_> = path.trim_end_matches('/').split('/').collect();
    t.len() == p.len()
        && t.iter().zip(&p).all(|(ts, ps)| {
            if ts.starts_with('{') && ts.ends_with('}') {
                !ps.is_empty()
            } else {
                ts == ps
            }
        })
}
