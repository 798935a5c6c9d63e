//! Request handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use relwatch_core::RelwatchError;
use relwatch_core::types::{ChannelKind, RepoId};
use relwatch_engine::CheckOutcome;

use crate::AppState;

type Reply = (StatusCode, Json<Value>);

fn err(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(json!({ "error": message.into() })))
}

fn internal(e: RelwatchError) -> Reply {
    err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn health() -> Reply {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

// ─── Projects ──────────────────────────────────────

pub async fn list_projects(State(state): State<Arc<AppState>>) -> Reply {
    match state.store.list_projects() {
        Ok(projects) => (StatusCode::OK, Json(json!({ "projects": projects }))),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct AddProject {
    pub repo: String,
    #[serde(default)]
    pub tag_id: Option<i64>,
}

pub async fn add_project(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddProject>,
) -> Reply {
    let Some(repo) = RepoId::parse(&body.repo) else {
        return err(StatusCode::BAD_REQUEST, "expected owner/name");
    };

    match state.source.repo_exists(&repo).await {
        Ok(true) => {}
        Ok(false) => return err(StatusCode::NOT_FOUND, format!("{repo} not found")),
        Err(e) => return err(StatusCode::BAD_GATEWAY, format!("could not verify {repo}: {e}")),
    }

    let project_id = match state.store.add_project(&repo) {
        Ok(Some(id)) => id,
        Ok(None) => return err(StatusCode::CONFLICT, format!("{repo} is already tracked")),
        Err(e) => return internal(e),
    };

    if let Some(tag_id) = body.tag_id
        && let Err(e) = state.store.assign_tag(project_id, tag_id)
    {
        warn!("could not assign tag {tag_id} to {repo}: {e}");
    }

    // Seed the marker so existing releases are not re-announced. A failure
    // here is recoverable: the next cycle bootstraps instead.
    if let Err(e) = state.dispatcher.bootstrap_project(project_id, &repo).await {
        warn!("bootstrap failed for {repo}: {e}");
    }

    match state.store.get_project(&repo) {
        Ok(Some(project)) => (StatusCode::CREATED, Json(json!({ "project": project }))),
        Ok(None) => internal(RelwatchError::Store("project vanished after insert".into())),
        Err(e) => internal(e),
    }
}

pub async fn remove_project(
    State(state): State<Arc<AppState>>,
    Path((owner, name)): Path<(String, String)>,
) -> Reply {
    let repo = RepoId::new(owner, name);
    match state.store.remove_project(&repo) {
        Ok(true) => (StatusCode::OK, Json(json!({ "removed": repo.to_string() }))),
        Ok(false) => err(StatusCode::NOT_FOUND, format!("{repo} is not tracked")),
        Err(e) => internal(e),
    }
}

pub async fn assign_tag(
    State(state): State<Arc<AppState>>,
    Path((owner, name, tag_id)): Path<(String, String, i64)>,
) -> Reply {
    let repo = RepoId::new(owner, name);
    let project = match state.store.get_project(&repo) {
        Ok(Some(project)) => project,
        Ok(None) => return err(StatusCode::NOT_FOUND, format!("{repo} is not tracked")),
        Err(e) => return internal(e),
    };
    match state.store.get_tag(tag_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(StatusCode::NOT_FOUND, format!("no tag {tag_id}")),
        Err(e) => return internal(e),
    }
    match state.store.assign_tag(project.id, tag_id) {
        Ok(()) => (StatusCode::OK, Json(json!({ "assigned": tag_id }))),
        Err(e) => internal(e),
    }
}

pub async fn unassign_tag(
    State(state): State<Arc<AppState>>,
    Path((owner, name, tag_id)): Path<(String, String, i64)>,
) -> Reply {
    let repo = RepoId::new(owner, name);
    let project = match state.store.get_project(&repo) {
        Ok(Some(project)) => project,
        Ok(None) => return err(StatusCode::NOT_FOUND, format!("{repo} is not tracked")),
        Err(e) => return internal(e),
    };
    match state.store.unassign_tag(project.id, tag_id) {
        Ok(true) => (StatusCode::OK, Json(json!({ "unassigned": tag_id }))),
        Ok(false) => err(
            StatusCode::NOT_FOUND,
            format!("tag {tag_id} is not assigned to {repo}"),
        ),
        Err(e) => internal(e),
    }
}

// ─── Releases ──────────────────────────────────────

#[derive(Deserialize)]
pub struct ReleasesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn recent_releases(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReleasesQuery>,
) -> Reply {
    match state.store.recent_releases(query.limit.min(200)) {
        Ok(releases) => (StatusCode::OK, Json(json!({ "releases": releases }))),
        Err(e) => internal(e),
    }
}

// ─── Tags ──────────────────────────────────────

pub async fn list_tags(State(state): State<Arc<AppState>>) -> Reply {
    match state.store.list_tags() {
        Ok(tags) => (StatusCode::OK, Json(json!({ "tags": tags }))),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct CreateTag {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#8b5cf6".to_string()
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTag>,
) -> Reply {
    if body.name.trim().is_empty() {
        return err(StatusCode::BAD_REQUEST, "tag name must not be empty");
    }
    match state.store.create_tag(&body.name, &body.color) {
        Ok(Some(id)) => match state.store.get_tag(id) {
            Ok(Some(tag)) => (StatusCode::CREATED, Json(json!({ "tag": tag }))),
            Ok(None) => internal(RelwatchError::Store("tag vanished after insert".into())),
            Err(e) => internal(e),
        },
        Ok(None) => err(
            StatusCode::CONFLICT,
            format!("tag '{}' already exists", body.name.trim()),
        ),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<i64>,
    Json(body): Json<UpdateTag>,
) -> Reply {
    match state
        .store
        .update_tag(tag_id, body.name.as_deref(), body.color.as_deref())
    {
        Ok(true) => match state.store.get_tag(tag_id) {
            Ok(Some(tag)) => (StatusCode::OK, Json(json!({ "tag": tag }))),
            Ok(None) => err(StatusCode::NOT_FOUND, format!("no tag {tag_id}")),
            Err(e) => internal(e),
        },
        Ok(false) => err(StatusCode::NOT_FOUND, format!("no tag {tag_id}")),
        Err(e) => internal(e),
    }
}

pub async fn delete_tag(State(state): State<Arc<AppState>>, Path(tag_id): Path<i64>) -> Reply {
    match state.store.delete_tag(tag_id) {
        Ok(true) => (StatusCode::OK, Json(json!({ "deleted": tag_id }))),
        Ok(false) => err(StatusCode::NOT_FOUND, format!("no tag {tag_id}")),
        Err(e) => internal(e),
    }
}

#[derive(Deserialize)]
pub struct ToggleChannel {
    pub enabled: bool,
}

pub async fn set_tag_channel(
    State(state): State<Arc<AppState>>,
    Path((tag_id, kind)): Path<(i64, String)>,
    Json(body): Json<ToggleChannel>,
) -> Reply {
    let Ok(kind) = kind.parse::<ChannelKind>() else {
        return err(StatusCode::BAD_REQUEST, format!("unknown channel '{kind}'"));
    };
    match state.store.set_tag_channel(tag_id, kind, body.enabled) {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "tag_id": tag_id, "channel": kind, "enabled": body.enabled })),
        ),
        Ok(false) => err(StatusCode::NOT_FOUND, format!("no tag {tag_id}")),
        Err(e) => internal(e),
    }
}

// ─── Checks & diagnostics ──────────────────────────────────────

pub async fn check_now(State(state): State<Arc<AppState>>) -> Reply {
    match state.scheduler.check_now().await {
        CheckOutcome::Completed(report) => (StatusCode::OK, Json(json!({ "report": report }))),
        CheckOutcome::AlreadyRunning => {
            err(StatusCode::CONFLICT, "a check is already running")
        }
    }
}

pub async fn last_cycle(State(state): State<Arc<AppState>>) -> Reply {
    match state.scheduler.last_report().await {
        Some(report) => (StatusCode::OK, Json(json!({ "report": report }))),
        None => (StatusCode::OK, Json(json!({ "report": Value::Null }))),
    }
}

pub async fn test_channel(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Reply {
    let Ok(kind) = kind.parse::<ChannelKind>() else {
        return err(StatusCode::BAD_REQUEST, format!("unknown channel '{kind}'"));
    };
    let Some(channel) = state.dispatcher.channel(kind) else {
        return err(StatusCode::NOT_FOUND, format!("channel {kind} not registered"));
    };
    let outcome = channel.send_test().await;
    (
        StatusCode::OK,
        Json(json!({ "channel": kind, "outcome": outcome })),
    )
}
