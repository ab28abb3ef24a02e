//! JSON-over-HTTP surface for the approval workflow.
//!
//! Identity is supplied by the fronting gateway in `x-principal-id` and
//! `x-principal-role` and trusted as-is. Every response that fails carries the
//! request's correlation id, taken from `x-correlation-id` when present.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use claimflow_core::{
    ActionableStep, ApprovalStepId, Claim, ClaimFields, Decision, EmployeeId, EventContext,
    InterfaceError, Principal, Role, StepResolution, SubmissionOutcome, WorkflowDefinition,
    WorkflowError,
};
use claimflow_db::{ClaimWorkflowEngine, Directory};

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<ClaimWorkflowEngine>,
}

pub fn router(engine: Arc<ClaimWorkflowEngine>) -> Router {
    Router::new()
        .route("/api/v1/workflows", post(create_workflow))
        .route("/api/v1/claims", post(submit_claim))
        .route("/api/v1/approvals/pending", get(list_pending))
        .route("/api/v1/approvals/resolve", post(resolve_step))
        .with_state(ApiState { engine })
}

// Error body

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub error_class: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

pub type ApiError = (StatusCode, Json<ApiErrorBody>);

fn status_of(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn api_error(error: InterfaceError) -> ApiError {
    if let InterfaceError::ServiceUnavailable { message, correlation_id, .. } = &error {
        error!(
            event_name = "api.request.store_unavailable",
            correlation_id = %correlation_id,
            error = %message,
            "request failed on store access"
        );
    }

    (
        status_of(&error),
        Json(ApiErrorBody {
            error: error.user_message(),
            error_class: error.class().to_string(),
            correlation_id: error.correlation_id().to_string(),
            details: error.details().to_vec(),
        }),
    )
}

fn workflow_error(request: &RequestContext, error: WorkflowError) -> ApiError {
    api_error(error.into_interface(request.correlation_id.clone()))
}

fn body_error(correlation_id: &str, rejection: JsonRejection) -> ApiError {
    api_error(InterfaceError::BadRequest {
        class: "invalid_request_body",
        message: "request body is not valid JSON for this operation".to_string(),
        details: vec![rejection.body_text()],
        correlation_id: correlation_id.to_string(),
    })
}

// Identity

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: Principal,
    pub correlation_id: String,
}

impl RequestContext {
    fn events(&self) -> EventContext {
        EventContext::new(self.correlation_id.clone(), self.principal.id.clone())
    }
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn request_context(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let correlation_id = header_value(headers, CORRELATION_ID_HEADER)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let unauthorized = |message: &str| {
        api_error(InterfaceError::Unauthorized {
            message: message.to_string(),
            correlation_id: correlation_id.clone(),
        })
    };

    let id = header_value(headers, PRINCIPAL_ID_HEADER)
        .ok_or_else(|| unauthorized("missing x-principal-id header"))?;
    let role = header_value(headers, PRINCIPAL_ROLE_HEADER)
        .and_then(Role::parse)
        .ok_or_else(|| unauthorized("missing or unrecognised x-principal-role header"))?;

    Ok(RequestContext { principal: Principal::new(id, role), correlation_id })
}

fn require_admin(request: &RequestContext) -> Result<(), ApiError> {
    if request.principal.is_admin() {
        return Ok(());
    }
    warn!(
        event_name = "api.request.forbidden",
        correlation_id = %request.correlation_id,
        actor = %request.principal.id,
        role = request.principal.role.as_str(),
        "non-admin attempted an admin operation"
    );
    Err(api_error(InterfaceError::Forbidden {
        message: "creating approval workflows requires the admin role".to_string(),
        correlation_id: request.correlation_id.clone(),
    }))
}

// createWorkflowDefinition

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CreateWorkflowRequest {
    /// Either `employee_id` or `employee_name` must be given.
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub employee_name: Option<String>,
    /// Any JSON value; anything but a list of id strings is `invalid_approver_list`.
    #[serde(default)]
    pub additional_approver_ids: Value,
}

fn approver_ids(value: &Value) -> Result<Vec<EmployeeId>, WorkflowError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(WorkflowError::MalformedApproverList(format!(
                "additional_approver_ids must be a list of employee ids, got {}",
                json_kind(other)
            )))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item.as_str().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(EmployeeId::new(id)),
            _ => Err(WorkflowError::MalformedApproverList(format!(
                "additional_approver_ids[{index}] must be a non-empty employee id string"
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalStep {
    pub step_order: u32,
    pub approver_id: EmployeeId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkflowResponse {
    pub workflow_id: String,
    pub employee_id: EmployeeId,
    pub final_steps: Vec<FinalStep>,
}

impl From<WorkflowDefinition> for CreateWorkflowResponse {
    fn from(definition: WorkflowDefinition) -> Self {
        let final_steps = definition
            .approvers
            .numbered()
            .map(|(step_order, approver)| FinalStep { step_order, approver_id: approver.clone() })
            .collect();
        Self { workflow_id: definition.id.0, employee_id: definition.employee_id, final_steps }
    }
}

pub async fn create_workflow(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateWorkflowResponse>), ApiError> {
    let request = request_context(&headers)?;
    require_admin(&request)?;
    let Json(body) = body.map_err(|rejection| body_error(&request.correlation_id, rejection))?;

    let employee_id = match (body.employee_id.as_deref().map(str::trim), body.employee_name) {
        (Some(id), _) if !id.is_empty() => EmployeeId::new(id),
        (_, Some(name)) if !name.trim().is_empty() => state
            .engine
            .directory()
            .resolve_by_name(&name)
            .await
            .map_err(|error| workflow_error(&request, error))?,
        _ => {
            return Err(api_error(InterfaceError::BadRequest {
                class: "invalid_request_body",
                message: "employee_id or employee_name is required".to_string(),
                details: Vec::new(),
                correlation_id: request.correlation_id.clone(),
            }))
        }
    };

    let additional = approver_ids(&body.additional_approver_ids)
        .map_err(|error| workflow_error(&request, error))?;

    let definition = state
        .engine
        .create_definition(&request.events(), &employee_id, additional)
        .await
        .map_err(|error| workflow_error(&request, error))?;

    Ok((StatusCode::CREATED, Json(definition.into())))
}

// submitClaim

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningBody {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitClaimResponse {
    pub claim: Claim,
    pub approval_steps_created: u32,
    pub warning: Option<WarningBody>,
}

impl From<SubmissionOutcome> for SubmitClaimResponse {
    fn from(outcome: SubmissionOutcome) -> Self {
        let warning = outcome.warning.map(|warning| WarningBody {
            code: serde_json::to_value(warning)
                .ok()
                .and_then(|value| value.as_str().map(ToOwned::to_owned))
                .unwrap_or_default(),
            message: warning.message().to_string(),
        });
        Self { claim: outcome.claim, approval_steps_created: outcome.approval_steps_created, warning }
    }
}

pub async fn submit_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ClaimFields>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitClaimResponse>), ApiError> {
    let request = request_context(&headers)?;
    let Json(fields) = body.map_err(|rejection| body_error(&request.correlation_id, rejection))?;

    let outcome = state
        .engine
        .submit(&request.events(), &request.principal.id, &fields)
        .await
        .map_err(|error| workflow_error(&request, error))?;

    let status = if outcome.warning.is_some() { StatusCode::ACCEPTED } else { StatusCode::CREATED };
    Ok((status, Json(outcome.into())))
}

// listActionable

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResponse {
    pub approver_id: EmployeeId,
    pub items: Vec<ActionableStep>,
}

pub async fn list_pending(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<PendingResponse>, ApiError> {
    let request = request_context(&headers)?;

    let items = state
        .engine
        .list_actionable(&request.principal.id)
        .await
        .map_err(|error| workflow_error(&request, error))?;

    Ok(Json(PendingResponse { approver_id: request.principal.id, items }))
}

// resolveStep

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ResolveRequest {
    pub step_id: String,
    pub action: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

pub async fn resolve_step(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<StepResolution>, ApiError> {
    let request = request_context(&headers)?;
    let Json(body) = body.map_err(|rejection| body_error(&request.correlation_id, rejection))?;

    let decision = Decision::parse(&body.action)
        .ok_or_else(|| workflow_error(&request, WorkflowError::InvalidAction(body.action.clone())))?;

    let resolution = state
        .engine
        .resolve(
            &request.events(),
            &request.principal.id,
            &ApprovalStepId(body.step_id.trim().to_string()),
            decision,
            body.remarks,
        )
        .await
        .map_err(|error| workflow_error(&request, error))?;

    Ok(Json(resolution))
}
