//! Test-case generation: discovery + swagger → ordered test plan.
//!
//! Custom blocks come first, then one block per discovery item. Item `i`
//! numbers its cases from `1000 * (i + 1) + 1`, so IDs stay stable and
//! unique for a given discovery. Within an item, declared endpoints are
//! grouped by path in first-declaration order and each path's verbs are
//! emitted DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT.

mod custom;

use crate::context::Context;
use crate::discovery::{Discovery, DiscoveryItem, Endpoint};
use crate::model::{ContextPut, Expect, Input, SpecificationTestCases, TestCase};
use crate::paths::substitute_resource_ids;
use crate::permissions::{
    weave_authorization, PermissionPlanner, PermissionTable, SpecConsentRequirements,
};
use crate::specification::{SpecRegistry, SpecificationNotFound};
use crate::swagger::{HttpMethod, SchemaError, SwaggerDoc, SwaggerSource};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const ID_BLOCK: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    UnknownSpecification(#[from] SpecificationNotFound),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("custom test '{id}': {message}")]
    CustomTest { id: String, message: String },
}

/// Cases plus the consent bundles they were woven against.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlan {
    pub test_cases: Vec<SpecificationTestCases>,
    pub consents: Vec<SpecConsentRequirements>,
}

pub struct Generator<'a> {
    registry: &'a SpecRegistry,
    swagger: &'a dyn SwaggerSource,
    permissions: &'a PermissionTable,
}

impl<'a> Generator<'a> {
    pub fn new(
        registry: &'a SpecRegistry,
        swagger: &'a dyn SwaggerSource,
        permissions: &'a PermissionTable,
    ) -> Self {
        Self {
            registry,
            swagger,
            permissions,
        }
    }

    pub async fn generate(
        &self,
        discovery: &Discovery,
    ) -> Result<Vec<SpecificationTestCases>, GenerationError> {
        Ok(self.generate_plan(discovery).await?.test_cases)
    }

    pub async fn generate_plan(&self, discovery: &Discovery) -> Result<GeneratedPlan, GenerationError> {
        let model = &discovery.discovery_model;
        let mut test_cases = custom::expand(&model.custom_tests)?;

        for (i, item) in model.discovery_items.iter().enumerate() {
            let spec = self
                .registry
                .from_schema_version(&item.api_specification.schema_version)?;
            let doc = self.swagger.load(&spec.schema_version).await?;
            let mut counter = ID_BLOCK * (i as u32 + 1);
            let cases = generate_item(item, &doc, &mut counter);
            debug!(spec = %spec.identifier, cases = cases.len(), "generated test cases");
            test_cases.push(SpecificationTestCases {
                api_specification: spec.clone(),
                test_cases: cases,
            });
        }

        let consents = PermissionPlanner::new(self.permissions).plan(&test_cases);
        weave_authorization(&mut test_cases, &consents);
        Ok(GeneratedPlan {
            test_cases,
            consents,
        })
    }
}

fn generate_item(item: &DiscoveryItem, doc: &SwaggerDoc, counter: &mut u32) -> Vec<TestCase> {
    let mut cases = Vec::new();
    for (path, endpoints) in group_by_path(&item.endpoints) {
        let Some(path_item) = doc.path(path) else {
            warn!(path, "declared path not found in swagger");
            continue;
        };
        let declared: BTreeSet<HttpMethod> = endpoints
            .iter()
            .filter_map(|e| HttpMethod::parse(&e.method))
            .collect();

        for (method, op) in path_item.operations().filter(|(m, _)| declared.contains(m)) {
            let Some(status) = op.success_status() else {
                warn!(%method, path, "NoSuccessResponse: no 2xx response declared, endpoint skipped");
                continue;
            };
            *counter += 1;
            let endpoint = endpoints
                .iter()
                .find(|e| HttpMethod::parse(&e.method) == Some(method))
                .copied();
            cases.push(build_case(
                format!("#t{counter}"),
                method,
                path,
                &op.summary,
                status,
                item,
                endpoint,
            ));
        }

        for missing in declared
            .iter()
            .filter(|m| path_item.get(**m).is_none())
        {
            warn!(method = %missing, path, "declared method not found in swagger");
        }
    }
    cases
}

/// Paths in first-declaration order, each with its declared endpoints.
fn group_by_path(endpoints: &[Endpoint]) -> Vec<(&str, Vec<&Endpoint>)> {
    let mut groups: Vec<(&str, Vec<&Endpoint>)> = Vec::new();
    for e in endpoints {
        match groups.iter_mut().find(|(p, _)| *p == e.path) {
            Some((_, list)) => list.push(e),
            None => groups.push((e.path.as_str(), vec![e])),
        }
    }
    groups
}

fn default_headers() -> BTreeMap<String, String> {
    [
        ("Authorization", "Bearer $access_token"),
        ("X-Fapi-Financial-Id", "$fapi_financial_id"),
        ("X-Fapi-Interaction-Id", "$fapi_interaction_id"),
        ("Content-Type", "application/json"),
        ("Accept", "*/*"),
        ("User-Agent", crate::USER_AGENT),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn build_case(
    id: String,
    method: HttpMethod,
    path: &str,
    summary: &str,
    status: u16,
    item: &DiscoveryItem,
    endpoint: Option<&Endpoint>,
) -> TestCase {
    let mut context = Context::new();
    context.put("baseurl", item.resource_base_uri.clone());
    if let Some(props) = endpoint
        .map(|e| &e.conditional_properties)
        .filter(|p| !p.is_empty())
    {
        if let Ok(json) = serde_json::to_string(props) {
            context.put("conditional_properties", json);
        }
    }

    let context_put = if method == HttpMethod::Post && path.ends_with("-consents") {
        vec![ContextPut {
            name: "ConsentId".to_string(),
            json: "Data.ConsentId".to_string(),
        }]
    } else {
        Vec::new()
    };

    TestCase {
        id,
        name: summary.to_string(),
        input: Input {
            method: method.as_str().to_string(),
            endpoint: substitute_resource_ids(path, &item.resource_ids),
            headers: default_headers(),
            body: None,
            replace_parameters: BTreeMap::new(),
        },
        context,
        expect: Expect {
            status_code: status,
            schema_validation: true,
            matches: Vec::new(),
        },
        context_put,
        permissions: Vec::new(),
        permissions_excluded: Vec::new(),
    }
}
