//! Tag-driven structural checks over the raw discovery JSON.
//!
//! Rules are declared per field as a list of tags, checked in order; the
//! first failing tag of a field ends checking for that field. Failures are
//! keyed by the field's locator, e.g.
//! `DiscoveryModel.DiscoveryItems[0].APISpecification.Name`.

use super::ValidationFailure;
use serde_json::{Map, Value};

pub(crate) enum Tag {
    Required,
    /// `gt=0` on a sequence.
    NonEmpty,
    Url,
    Uri,
    FileOrHttps,
    OneOf(&'static [&'static str]),
    /// Apply the rules to every element of a sequence.
    Dive(&'static [FieldRule]),
    /// Apply the rules to a nested object.
    Struct(&'static [FieldRule]),
}

impl Tag {
    fn name(&self) -> &'static str {
        match self {
            Tag::Required => "required",
            Tag::NonEmpty => "gt",
            Tag::Url => "url",
            Tag::Uri => "uri",
            Tag::FileOrHttps => "fileorhttps",
            Tag::OneOf(_) => "oneof",
            Tag::Dive(_) => "dive",
            Tag::Struct(_) => "struct",
        }
    }
}

pub(crate) struct FieldRule {
    /// Key in the JSON document.
    pub json: &'static str,
    /// Name used in failure locators.
    pub field: &'static str,
    pub tags: &'static [Tag],
}

const HTTP_METHODS: &[&str] = &["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

const CONDITIONAL_PROPERTY_RULES: &[FieldRule] = &[
    FieldRule {
        json: "schema",
        field: "Schema",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "property",
        field: "Property",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "path",
        field: "Path",
        tags: &[Tag::Required],
    },
];

const ENDPOINT_RULES: &[FieldRule] = &[
    FieldRule {
        json: "method",
        field: "Method",
        tags: &[Tag::Required, Tag::OneOf(HTTP_METHODS)],
    },
    FieldRule {
        json: "path",
        field: "Path",
        tags: &[Tag::Required, Tag::Uri],
    },
    FieldRule {
        json: "conditionalProperties",
        field: "ConditionalProperties",
        tags: &[Tag::Dive(CONDITIONAL_PROPERTY_RULES)],
    },
];

const API_SPECIFICATION_RULES: &[FieldRule] = &[
    FieldRule {
        json: "name",
        field: "Name",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "url",
        field: "URL",
        tags: &[Tag::Required, Tag::Url],
    },
    FieldRule {
        json: "version",
        field: "Version",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "schemaVersion",
        field: "SchemaVersion",
        tags: &[Tag::Required, Tag::Url],
    },
    FieldRule {
        json: "manifest",
        field: "Manifest",
        tags: &[Tag::Required, Tag::FileOrHttps],
    },
];

const ITEM_RULES: &[FieldRule] = &[
    FieldRule {
        json: "apiSpecification",
        field: "APISpecification",
        tags: &[Tag::Required, Tag::Struct(API_SPECIFICATION_RULES)],
    },
    FieldRule {
        json: "openidConfigurationUri",
        field: "OpenidConfigurationURI",
        tags: &[Tag::Required, Tag::Url],
    },
    FieldRule {
        json: "resourceBaseUri",
        field: "ResourceBaseURI",
        tags: &[Tag::Required, Tag::Url],
    },
    FieldRule {
        json: "endpoints",
        field: "Endpoints",
        tags: &[Tag::Required, Tag::NonEmpty, Tag::Dive(ENDPOINT_RULES)],
    },
];

const CUSTOM_TEST_RULES: &[FieldRule] = &[
    FieldRule {
        json: "@id",
        field: "ID",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "name",
        field: "Name",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "sequence",
        field: "Sequence",
        tags: &[Tag::Required, Tag::NonEmpty],
    },
];

const MODEL_RULES: &[FieldRule] = &[
    FieldRule {
        json: "name",
        field: "Name",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "description",
        field: "Description",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "discoveryVersion",
        field: "DiscoveryVersion",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "tokenAcquisition",
        field: "TokenAcquisition",
        tags: &[Tag::Required],
    },
    FieldRule {
        json: "discoveryItems",
        field: "DiscoveryItems",
        tags: &[Tag::Required, Tag::NonEmpty, Tag::Dive(ITEM_RULES)],
    },
    FieldRule {
        json: "customTests",
        field: "CustomTests",
        tags: &[Tag::Dive(CUSTOM_TEST_RULES)],
    },
];

/// Run every structural rule over `doc`. A missing `discoveryModel` is
/// checked as an empty object so each required header field is reported.
pub(crate) fn check(doc: &Value) -> Vec<ValidationFailure> {
    let empty = Map::new();
    let model = doc
        .get("discoveryModel")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let mut failures = Vec::new();
    check_object(model, "DiscoveryModel", MODEL_RULES, &mut failures);
    failures
}

fn check_object(
    obj: &Map<String, Value>,
    prefix: &str,
    rules: &[FieldRule],
    failures: &mut Vec<ValidationFailure>,
) {
    for rule in rules {
        let key = format!("{prefix}.{}", rule.field);
        let value = obj.get(rule.json).filter(|v| !v.is_null());
        check_field(value, &key, rule, failures);
    }
}

fn check_field(
    value: Option<&Value>,
    key: &str,
    rule: &FieldRule,
    failures: &mut Vec<ValidationFailure>,
) {
    for tag in rule.tags {
        let Some(value) = value else {
            if matches!(tag, Tag::Required) {
                failures.push(ValidationFailure::new(key, format!("Field '{key}' is required")));
            }
            // optional and absent: nothing further to check
            return;
        };

        let ok = match tag {
            Tag::Required => !is_zero(value),
            Tag::NonEmpty => value.as_array().map(|a| !a.is_empty()).unwrap_or(false),
            Tag::Url => value.as_str().map(is_url).unwrap_or(false),
            Tag::Uri => value
                .as_str()
                .map(|s| s.starts_with('/') || is_url(s))
                .unwrap_or(false),
            Tag::FileOrHttps => value
                .as_str()
                .map(|s| s.starts_with("file://") || s.starts_with("https://"))
                .unwrap_or(false),
            Tag::OneOf(allowed) => value
                .as_str()
                .map(|s| allowed.contains(&s))
                .unwrap_or(false),
            Tag::Dive(inner) => match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let item_key = format!("{key}[{i}]");
                        match item.as_object() {
                            Some(obj) => check_object(obj, &item_key, inner, failures),
                            None => failures.push(tag_failure(&item_key, rule.field, tag)),
                        }
                    }
                    true
                }
                None => false,
            },
            Tag::Struct(inner) => match value.as_object() {
                Some(obj) => {
                    check_object(obj, key, inner, failures);
                    true
                }
                None => false,
            },
        };

        if !ok {
            failures.push(tag_failure(key, rule.field, tag));
            return;
        }
    }
}

fn tag_failure(key: &str, field: &str, tag: &Tag) -> ValidationFailure {
    let message = match tag {
        Tag::Required => format!("Field '{key}' is required"),
        Tag::NonEmpty => format!("Field '{key}' cannot be empty"),
        Tag::FileOrHttps => format!("Field '{key}' must be 'file://' or 'https://'"),
        other => format!(
            "Field validation for '{field}' failed on the '{}' tag",
            other.name()
        ),
    };
    ValidationFailure::new(key, message)
}

/// Zero values fail `required`: empty strings, but not empty sequences
/// (those are caught by `gt`).
fn is_zero(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.is_empty())
}

fn is_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| !u.scheme().is_empty() && (u.has_host() || u.scheme() == "file"))
        .unwrap_or(false)
}
