//! HTTP routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use questline_domain::{
    ActivityKind, ActivitySession, Character, CharacterId, CombatInstance, CombatStyle, EnemyId,
    EventId, ExpeditionType, RiskAssessment, ZoneId,
};

use crate::app::App;
use crate::use_cases::activity::{
    ActivityError, CraftingRequest, ExplorationRequest, FinalizedLedger, PollResult,
    TravelRequest,
};
use crate::use_cases::character::CharacterError;
use crate::use_cases::combat::{CombatError, CombatResult, TurnOutcome};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/characters", post(create_character))
        .route("/api/characters/{id}", get(get_character))
        .route("/api/characters/{id}/activities/{kind}", get(poll_activity))
        .route(
            "/api/characters/{id}/activities/{kind}/start",
            post(start_activity),
        )
        .route(
            "/api/characters/{id}/activities/{kind}/stop",
            post(stop_activity),
        )
        .route(
            "/api/characters/{id}/activities/{kind}/cancel",
            post(cancel_activity),
        )
        .route(
            "/api/characters/{id}/activities/{kind}/event/resolve",
            post(resolve_event),
        )
        .route(
            "/api/characters/{id}/activities/{kind}/risk",
            get(preview_risk),
        )
        .route("/api/characters/{id}/combat", get(get_combat))
        .route("/api/characters/{id}/combat/start", post(start_combat))
        .route("/api/characters/{id}/combat/turn", post(combat_turn))
        .route("/api/characters/{id}/combat/auto", post(combat_auto))
        .route("/api/characters/{id}/combat/end", post(end_combat))
        .route("/api/characters/{id}/combat/abandon", post(abandon_combat))
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Characters
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateCharacterBody {
    name: String,
    zone: ZoneId,
}

async fn create_character(
    State(app): State<Arc<App>>,
    Json(body): Json<CreateCharacterBody>,
) -> Result<(StatusCode, Json<Character>), ApiError> {
    let character = app
        .use_cases
        .characters
        .create(&body.name, &body.zone)
        .await?;
    Ok((StatusCode::CREATED, Json(character)))
}

async fn get_character(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Character>, ApiError> {
    let character = app
        .use_cases
        .characters
        .get(CharacterId::from_uuid(id))
        .await?;
    Ok(Json(character))
}

// =============================================================================
// Activities
// =============================================================================

async fn start_activity(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, ActivityKind)>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ActivitySession>), ApiError> {
    let character_id = CharacterId::from_uuid(id);
    let activities = &app.use_cases.activities;

    let session = match kind {
        ActivityKind::Travel => {
            activities
                .travel
                .start(character_id, parse_body::<TravelRequest>(body)?)
                .await?
        }
        ActivityKind::Exploration => {
            activities
                .exploration
                .start(character_id, parse_body::<ExplorationRequest>(body)?)
                .await?
        }
        ActivityKind::Crafting => {
            activities
                .crafting
                .start(character_id, parse_body::<CraftingRequest>(body)?)
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(session)))
}

async fn poll_activity(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, ActivityKind)>,
) -> Result<Json<PollResult>, ApiError> {
    let result = app
        .use_cases
        .activities
        .poll(CharacterId::from_uuid(id), kind)
        .await?;
    Ok(Json(result))
}

async fn stop_activity(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, ActivityKind)>,
) -> Result<Json<FinalizedLedger>, ApiError> {
    let ledger = app
        .use_cases
        .activities
        .stop(CharacterId::from_uuid(id), kind)
        .await?;
    Ok(Json(ledger))
}

async fn cancel_activity(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, ActivityKind)>,
) -> Result<StatusCode, ApiError> {
    app.use_cases
        .activities
        .cancel(CharacterId::from_uuid(id), kind)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct ResolvedEvent {
    resolved: Option<EventId>,
}

async fn resolve_event(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, ActivityKind)>,
) -> Result<Json<ResolvedEvent>, ApiError> {
    let resolved = app
        .use_cases
        .activities
        .resolve_event(CharacterId::from_uuid(id), kind)
        .await?;
    Ok(Json(ResolvedEvent { resolved }))
}

#[derive(Debug, Deserialize)]
struct RiskQuery {
    zone: ZoneId,
    #[serde(default)]
    expedition: ExpeditionType,
}

async fn preview_risk(
    State(app): State<Arc<App>>,
    Path((id, kind)): Path<(Uuid, ActivityKind)>,
    Query(query): Query<RiskQuery>,
) -> Result<Json<RiskAssessment>, ApiError> {
    if kind != ActivityKind::Exploration {
        return Err(ApiError::BadRequest(format!(
            "Only exploration carries a risk, not {}",
            kind
        )));
    }
    let risk = app
        .use_cases
        .activities
        .exploration
        .preview_risk(CharacterId::from_uuid(id), &query.zone, query.expedition)
        .await?;
    Ok(Json(risk))
}

// =============================================================================
// Combat
// =============================================================================

#[derive(Debug, Deserialize)]
struct StartCombatBody {
    enemy: EnemyId,
}

#[derive(Debug, Deserialize)]
struct TurnBody {
    #[serde(default)]
    style: CombatStyle,
}

#[derive(Debug, Deserialize)]
struct AutoBody {
    #[serde(default)]
    style: CombatStyle,
    max_turns: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EndCombatBody {
    victory: bool,
}

async fn get_combat(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CombatInstance>, ApiError> {
    let combat = app
        .use_cases
        .combat
        .current(CharacterId::from_uuid(id))
        .await?;
    Ok(Json(combat))
}

async fn start_combat(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<StartCombatBody>,
) -> Result<(StatusCode, Json<CombatInstance>), ApiError> {
    let combat = app
        .use_cases
        .combat
        .start(CharacterId::from_uuid(id), &body.enemy)
        .await?;
    Ok((StatusCode::CREATED, Json(combat)))
}

async fn combat_turn(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<TurnBody>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = app
        .use_cases
        .combat
        .turn(CharacterId::from_uuid(id), body.style)
        .await?;
    Ok(Json(outcome))
}

async fn combat_auto(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AutoBody>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = app
        .use_cases
        .combat
        .auto_turns(CharacterId::from_uuid(id), body.style, body.max_turns)
        .await?;
    Ok(Json(outcome))
}

async fn end_combat(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<EndCombatBody>,
) -> Result<Json<CombatResult>, ApiError> {
    let result = app
        .use_cases
        .combat
        .end(CharacterId::from_uuid(id), body.victory)
        .await?;
    Ok(Json(result))
}

async fn abandon_combat(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CombatResult>, ApiError> {
    let result = app
        .use_cases
        .combat
        .abandon(CharacterId::from_uuid(id))
        .await?;
    Ok(Json(result))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    TooManyRequests(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, msg).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<crate::infrastructure::ports::RepoError> for ApiError {
    fn from(e: crate::infrastructure::ports::RepoError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<ActivityError> for ApiError {
    fn from(e: ActivityError) -> Self {
        match e {
            ActivityError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            ActivityError::NoActiveSession { .. } | ActivityError::CharacterNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            ActivityError::Validation(msg) => ApiError::BadRequest(msg),
            ActivityError::Inconsistent(_) | ActivityError::Repo(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<CombatError> for ApiError {
    fn from(e: CombatError) -> Self {
        match e {
            CombatError::Conflict => ApiError::Conflict(e.to_string()),
            CombatError::NoActiveCombat | CombatError::CharacterNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            CombatError::TurnInFlight => ApiError::TooManyRequests(e.to_string()),
            CombatError::Validation(msg) => ApiError::BadRequest(msg),
            CombatError::Inconsistent(_) | CombatError::Repo(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<CharacterError> for ApiError {
    fn from(e: CharacterError) -> Self {
        match e {
            CharacterError::NotFound(_) => ApiError::NotFound(e.to_string()),
            CharacterError::Validation(msg) => ApiError::BadRequest(msg),
            CharacterError::Repo(_) => ApiError::Internal(e.to_string()),
        }
    }
}
