//! Consent planning: the fewest named permission bundles covering a plan.
//!
//! Cases are taken largest requirement first (ties by plan order) and join
//! the first existing bundle they do not conflict with; a conflict is a
//! requested permission the bundle excludes, or the reverse. Bundle names
//! (`to1001`, `to1002`, ...) are numbered across the whole plan.

use super::{PermissionTable, ACCOUNT_ACCESS_CONSENTS};
use crate::model::SpecificationTestCases;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const FIRST_BUNDLE: u32 = 1001;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSet {
    pub permissions: Vec<String>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedPermission {
    pub name: String,
    pub code_set: CodeSet,
    pub test_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecConsentRequirements {
    pub identifier: String,
    pub named_permissions: Vec<NamedPermission>,
}

impl SpecConsentRequirements {
    pub fn bundle_for(&self, test_id: &str) -> Option<&NamedPermission> {
        self.named_permissions
            .iter()
            .find(|b| b.test_ids.iter().any(|t| t == test_id))
    }
}

struct Bundle {
    permissions: BTreeSet<String>,
    excluded: BTreeSet<String>,
    members: Vec<usize>,
    number: u32,
}

pub struct PermissionPlanner<'a> {
    table: &'a PermissionTable,
}

impl<'a> PermissionPlanner<'a> {
    pub fn new(table: &'a PermissionTable) -> Self {
        Self { table }
    }

    pub fn plan(&self, plan: &[SpecificationTestCases]) -> Vec<SpecConsentRequirements> {
        let mut next = FIRST_BUNDLE;
        plan.iter()
            .map(|spec| {
                let identifier = spec.api_specification.identifier.clone();
                let mut needs: Vec<_> = spec
                    .test_cases
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| self.table.requirement(c).map(|r| (i, r)))
                    .collect();
                // stable: ties keep plan order
                needs.sort_by(|a, b| b.1.required.len().cmp(&a.1.required.len()));

                let mut bundles: Vec<Bundle> = Vec::new();
                for (index, need) in needs {
                    let slot = bundles.iter_mut().find(|b| {
                        b.permissions.is_disjoint(&need.excluded)
                            && b.excluded.is_disjoint(&need.required)
                    });
                    match slot {
                        Some(bundle) => {
                            bundle.permissions.extend(need.required);
                            bundle.excluded.extend(need.excluded);
                            bundle.members.push(index);
                        }
                        None => {
                            bundles.push(Bundle {
                                permissions: need.required,
                                excluded: need.excluded,
                                members: vec![index],
                                number: next,
                            });
                            next += 1;
                        }
                    }
                }

                let scopes = self.table.scopes_for(&identifier);
                let named_permissions = bundles
                    .into_iter()
                    .map(|mut b| {
                        b.members.sort_unstable();
                        NamedPermission {
                            name: format!("to{}", b.number),
                            code_set: CodeSet {
                                permissions: b.permissions.into_iter().collect(),
                                scopes: scopes.clone(),
                            },
                            test_ids: b
                                .members
                                .iter()
                                .map(|&i| spec.test_cases[i].id.clone())
                                .collect(),
                        }
                    })
                    .collect::<Vec<_>>();

                debug!(spec = %identifier, bundles = named_permissions.len(), "planned consents");
                SpecConsentRequirements {
                    identifier,
                    named_permissions,
                }
            })
            .collect()
    }
}

/// Point each covered case's `Authorization` header at its bundle token.
pub fn weave_authorization(plan: &mut [SpecificationTestCases], consents: &[SpecConsentRequirements]) {
    let by_id: HashMap<(&str, &str), &str> = consents
        .iter()
        .flat_map(|spec| {
            spec.named_permissions.iter().flat_map(move |b| {
                b.test_ids
                    .iter()
                    .map(move |id| ((spec.identifier.as_str(), id.as_str()), b.name.as_str()))
            })
        })
        .collect();

    for spec in plan.iter_mut() {
        let identifier = spec.api_specification.identifier.clone();
        for case in spec.test_cases.iter_mut() {
            if case.path() == ACCOUNT_ACCESS_CONSENTS {
                continue;
            }
            let Some(bundle) = by_id.get(&(identifier.as_str(), case.id.as_str())) else {
                continue;
            };
            let key = case
                .input
                .headers
                .keys()
                .find(|k| k.eq_ignore_ascii_case("authorization"))
                .cloned()
                .unwrap_or_else(|| "Authorization".to_string());
            case.input.headers.insert(key, format!("Bearer ${bundle}"));
        }
    }
}
