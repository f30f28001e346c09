use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::config::schema::{Backend, Group, PortBinding};
use crate::control::ControlError;
use crate::lifecycle::server_set::{ListenerStatus, ReconcileReport};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub ports: usize,
    pub listeners: Vec<ListenerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateQuery {
    pub path: String,
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub url: String,
    #[serde(default)]
    pub health_check_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub url: String,
    pub healthy: bool,
}

#[derive(Serialize)]
struct ErrorReply {
    code: &'static str,
    message: String,
    status: u16,
}

/// Control error rendered as a JSON response.
pub struct AdminError(ControlError);

impl From<ControlError> for AdminError {
    fn from(err: ControlError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let reply = ErrorReply {
            code: self.0.code(),
            message: self.0.to_string(),
            status: status.as_u16(),
        };
        (status, Json(reply)).into_response()
    }
}

type AdminResult<T> = Result<T, AdminError>;

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        ports: state.service.registry().ports().len(),
        listeners: state.service.listeners(),
    })
}

pub async fn get_ports(State(state): State<AdminState>) -> Json<Vec<PortBinding>> {
    Json(state.service.snapshot())
}

pub async fn get_listeners(State(state): State<AdminState>) -> Json<Vec<ListenerStatus>> {
    Json(state.service.listeners())
}

pub async fn add_port(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
) -> AdminResult<(StatusCode, Json<PortBinding>)> {
    state.service.add_port(port)?;
    Ok((StatusCode::CREATED, Json(PortBinding::new(port))))
}

pub async fn remove_port(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
) -> AdminResult<Json<PortBinding>> {
    Ok(Json(state.service.remove_port(port)?))
}

pub async fn add_group(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Json(group): Json<Group>,
) -> AdminResult<(StatusCode, Json<Group>)> {
    state.service.add_group(port, group.clone())?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn remove_group(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Query(query): Query<GroupQuery>,
) -> AdminResult<Json<Group>> {
    Ok(Json(state.service.remove_group(port, &query.path)?))
}

pub async fn update_backends(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Query(query): Query<GroupQuery>,
    Json(backends): Json<Vec<Backend>>,
) -> AdminResult<Json<Group>> {
    Ok(Json(state.service.update_backends(port, &query.path, backends)?))
}

pub async fn activate_backend(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Query(query): Query<ActivateQuery>,
) -> AdminResult<Json<Group>> {
    let group = state
        .service
        .activate_backend(port, &query.path, query.index)
        .await?;
    Ok(Json(group))
}

pub async fn deactivate_backend(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Query(query): Query<GroupQuery>,
) -> AdminResult<Json<Group>> {
    Ok(Json(state.service.deactivate_backend(port, &query.path)?))
}

pub async fn select_healthy_backend(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Query(query): Query<GroupQuery>,
) -> AdminResult<Json<Group>> {
    Ok(Json(state.service.select_healthy_backend(port, &query.path).await?))
}

pub async fn check_group(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    Query(query): Query<GroupQuery>,
) -> AdminResult<Json<Vec<CheckResult>>> {
    let results = state.service.check_all(port, &query.path).await?;
    Ok(Json(
        results
            .into_iter()
            .map(|(url, healthy)| CheckResult { url, healthy })
            .collect(),
    ))
}

pub async fn check_backend(
    State(state): State<AdminState>,
    Json(request): Json<CheckRequest>,
) -> Json<CheckResult> {
    let healthy = match &request.health_check_path {
        Some(path) => state.service.check_backend_with_path(&request.url, path).await,
        None => state.service.check_backend(&request.url).await,
    };
    Json(CheckResult {
        url: request.url,
        healthy,
    })
}

pub async fn reconcile(State(state): State<AdminState>) -> Json<ReconcileReport> {
    Json(state.service.reconcile().await)
}
