use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};

use crate::commands::SuggestionOutput;
use crate::hosted::HostedModelClient;
use larder_core::error::LarderError;
use larder_core::models::{NewRecipe, Recipe, Role, Session, UpdateRecipe, User};
use larder_core::service::RecipeService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<RecipeService>>,
    hosted: Arc<HostedModelClient>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, RecipeService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateRecipeRequest {
    name: String,
    ingredients: String,
    steps: String,
    image: Option<String>,
    video: Option<String>,
    owner: Option<String>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateRecipeRequest {
    name: Option<String>,
    ingredients: Option<String>,
    steps: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    image: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    video: Option<Option<String>>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(Deserialize)]
struct SuggestQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Deserialize)]
struct SetPasswordRequest {
    password: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<LarderError>() {
            Ok(LarderError::NotFound(msg)) => Self::NotFound(msg),
            Ok(LarderError::Conflict(msg)) => Self::Conflict(msg),
            Ok(LarderError::Invalid(msg)) => Self::BadRequest(msg),
            Ok(LarderError::Forbidden(msg)) => Self::Forbidden(msg),
            Err(err) => Self::Internal(err),
        }
    }
}

// --- Middleware ---

/// Decode `Authorization: Basic base64(username:password)`.
fn basic_credentials(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(basic_credentials);

    let session = match credentials {
        Some((username, password)) => match state.svc().login(&username, &password) {
            Ok(session) => session,
            Err(err) => return ApiError::Internal(err).into_response(),
        },
        None => None,
    };

    let Some(session) = session else {
        debug!(path = %request.uri().path(), "rejected unauthenticated request");
        let mut response =
            ApiError::Unauthorized("Invalid or missing credentials".to_string()).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"larder\""),
        );
        return response;
    };

    request.extensions_mut().insert(session);
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn login(Extension(session): Extension<Session>) -> Json<Session> {
    Json(session)
}

async fn list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, ApiError> {
    let recipes = state.svc().list_recipes().context("failed to load recipes")?;
    Ok(Json(recipes))
}

async fn create_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let recipe = state.svc().add_recipe(
        &session,
        NewRecipe {
            name: req.name,
            ingredients: req.ingredients,
            steps: req.steps,
            image: req.image,
            video: req.video,
            owner: req.owner.unwrap_or_default(),
        },
    )?;
    info!(name = %recipe.name, user = %session.username, "recipe created");
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.svc().get_recipe(&name)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(name): Path<String>,
    Json(req): Json<UpdateRecipeRequest>,
) -> Result<Json<Recipe>, ApiError> {
    let update = UpdateRecipe {
        name: req.name,
        ingredients: req.ingredients,
        steps: req.steps,
        image: req.image,
        video: req.video,
    };
    let recipe = state.svc().update_recipe(&session, &name, &update)?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.svc().delete_recipe(&session, &name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_recipes(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let q = params.q.trim();
    if q.is_empty() {
        return Err(ApiError::BadRequest("q must not be empty".to_string()));
    }
    Ok(Json(state.svc().search_recipes(q)?))
}

async fn suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestQuery>,
) -> Result<Json<SuggestionOutput>, ApiError> {
    let suggestion = state.svc().suggest(&params.q, params.limit)?;
    Ok(Json(SuggestionOutput::from(&suggestion)))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state.svc().chat(&req.query)?;
    Ok(Json(ChatResponse { reply }))
}

async fn ask(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    // The store lock is released before the outbound call.
    let recipes = state.svc().list_recipes()?;
    let reply = state.hosted.ask(&req.query, &recipes).await;
    Ok(Json(ChatResponse { reply }))
}

async fn list_users(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.svc().list_users(&session)?))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.svc().create_user(
        Some(&session),
        &req.username,
        &req.password,
        req.role.unwrap_or(Role::User),
    )?;
    info!(username = %user.username, role = %user.role, by = %session.username, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.svc().delete_user(&session, &username)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_password(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(username): Path<String>,
    Json(req): Json<SetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .svc()
        .set_password(&session, &username, &req.password)?;
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/search", get(search_recipes))
        .route(
            "/api/recipes/{name}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/api/suggest", get(suggest))
        .route("/api/chat", post(chat))
        .route("/api/ask", post(ask))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{username}", delete(delete_user))
        .route("/api/users/{username}/password", put(set_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/api/health", get(health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: RecipeService,
    hosted: HostedModelClient,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    if !svc.has_users()? {
        warn!("no users exist; every request except /api/health will be rejected");
        eprintln!(
            "Warning: no users yet. Create an admin with `larder user add <name> --admin` or set LARDER_ADMIN_PASSWORD."
        );
    }
    let backend = svc.backend();

    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        hosted: Arc::new(hosted),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(%bind, port, store = %backend, "server started");
    eprintln!("Listening on http://{bind}:{port} ({backend} store)");
    axum::serve(listener, app).await?;

    Ok(())
}
