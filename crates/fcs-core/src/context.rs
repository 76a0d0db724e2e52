//! Run-scoped variable bag and `$variable` resolution.
//!
//! Templates reference variables as `$name` or `${name}`. Resolution is a
//! single pass over the template: substituted values are never rescanned.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    static ref VARIABLE: Regex =
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_\-]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolved variable(s): {}", .0.join(", "))]
pub struct UnresolvedVariable(pub Vec<String>);

/// String-keyed variables visible to a test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, String>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Later entries win.
    pub fn extend(&mut self, other: &Context) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn extend_pairs<'a>(&mut self, pairs: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (k, v) in pairs {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Substitute every variable reference in `template`.
    pub fn resolve(&self, template: &str) -> Result<String, UnresolvedVariable> {
        let mut missing = Vec::new();
        let out = self.resolve_collecting(template, &mut missing);
        if missing.is_empty() {
            Ok(out)
        } else {
            Err(UnresolvedVariable(missing))
        }
    }

    /// Like [`Context::resolve`] but accumulates missing names so a caller can
    /// resolve several fields and report every gap at once.
    pub fn resolve_collecting(&self, template: &str, missing: &mut Vec<String>) -> String {
        VARIABLE
            .replace_all(template, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match self.0.get(name) {
                    Some(v) => v.clone(),
                    None => {
                        if !missing.iter().any(|m| m == name) {
                            missing.push(name.to_string());
                        }
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

impl FromIterator<(String, String)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Replace `${key}` occurrences from a replacement map, leaving unknown keys
/// untouched. Used for custom-test parameters at generation time.
pub fn replace_parameters(template: &str, params: &BTreeMap<String, String>) -> String {
    VARIABLE
        .replace_all(template, |caps: &Captures<'_>| match caps.get(1) {
            Some(name) => params
                .get(name.as_str())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string()),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        [
            ("baseurl", "https://bank.example/open-banking/v3.1/aisp"),
            ("to1001", "tok-abc"),
            ("ConsentId", "aac-1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn resolves_both_reference_forms() {
        let c = ctx();
        assert_eq!(c.resolve("Bearer $to1001").unwrap(), "Bearer tok-abc");
        assert_eq!(
            c.resolve("/account-access-consents/${ConsentId}").unwrap(),
            "/account-access-consents/aac-1"
        );
    }

    #[test]
    fn reports_every_missing_variable_once() {
        let c = ctx();
        let err = c.resolve("$a $b $a $to1001").unwrap_err();
        assert_eq!(err, UnresolvedVariable(vec!["a".into(), "b".into()]));
        assert_eq!(err.to_string(), "unresolved variable(s): a, b");
    }

    #[test]
    fn substitution_is_single_pass() {
        let mut c = Context::new();
        c.put("outer", "$inner");
        c.put("inner", "boom");
        assert_eq!(c.resolve("$outer").unwrap(), "$inner");
    }

    #[test]
    fn replacement_map_touches_only_braced_known_keys() {
        let params: BTreeMap<String, String> =
            [("token_endpoint".to_string(), "https://as.example/token".to_string())].into();
        assert_eq!(
            replace_parameters("${token_endpoint} $keep ${unknown}", &params),
            "https://as.example/token $keep ${unknown}"
        );
    }
}
