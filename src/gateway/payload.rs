//! Wire payloads for the memory routes.
//!
//! Requests that match an engine type one-to-one (`RememberRequest`,
//! `MemoryQuery`, `ContextRequest`) deserialize directly into it; the
//! shapes here cover the rest.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::GatewayError;
use crate::engine::{ForgetSelector, MemoryQuery};
use crate::scoring::ScoredMemory;

/// Body of `POST /v1/memory/forget`: by id or by query.
#[derive(Debug, Deserialize)]
pub struct ForgetBody {
    /// Tenant, required when deleting by id.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Optional agent restriction for by-id deletes.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Record id to delete.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Query whose matches are deleted.
    #[serde(default)]
    pub query: Option<MemoryQuery>,
    /// Required for by-query deletion.
    #[serde(default)]
    pub confirm: bool,
}

impl ForgetBody {
    /// Resolves the body into a selector, rejecting ambiguous shapes.
    pub fn into_selector(self) -> Result<ForgetSelector, GatewayError> {
        match (self.id, self.query) {
            (Some(id), None) => {
                let tenant_id = self.tenant_id.ok_or_else(|| {
                    GatewayError::InvalidRequest(
                        "forget by id requires tenant_id".to_string(),
                    )
                })?;
                Ok(ForgetSelector::ById {
                    tenant_id,
                    agent_id: self.agent_id,
                    id,
                })
            }
            (None, Some(query)) => Ok(ForgetSelector::ByQuery {
                query,
                confirm: self.confirm,
            }),
            (Some(_), Some(_)) => Err(GatewayError::InvalidRequest(
                "provide either id or query, not both".to_string(),
            )),
            (None, None) => Err(GatewayError::InvalidRequest(
                "provide an id or a query".to_string(),
            )),
        }
    }
}

/// Response of `POST /v1/memory/remember`.
#[derive(Debug, Serialize)]
pub struct RememberResponse {
    /// Id of the stored (or deduplicated) memory.
    pub id: Uuid,
}

/// Response of `POST /v1/memory/recall`.
#[derive(Debug, Serialize)]
pub struct RecallResponse {
    /// Ranked results.
    pub memories: Vec<ScoredMemory>,
}

/// Query parameters of `GET /v1/memory/list`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Tenant whose records are listed.
    pub tenant_id: String,
    /// Optional agent restriction.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Opaque cursor from a previous page.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Page size.
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}
