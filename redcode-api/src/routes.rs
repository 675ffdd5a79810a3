use std::sync::Arc;

use axum::Router;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::ingest::{self, GameDataReport};
use crate::models::{Bot, PublicUser};
use crate::state::AppState;
use crate::store::{Stats, Store};

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/stats", get(stats))
        .route("/gamedata", post(game_data))
        .route("/bots", get(list_bots).post(add_bot))
        .route("/bots/{id}", delete(delete_bot))
        .route("/user/settings", put(update_settings))
        .route("/user/apikey", post(regenerate_api_key));

    Router::new().nest("/api", api).with_state(state)
}

/// Saves right away after user-visible changes. On failure the store stays
/// dirty and the periodic saver picks it up on its next tick.
async fn persist(store: &Store) {
    if let Err(e) = store.persist_now().await {
        warn!("immediate save failed, leaving it to the periodic saver: {e}");
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
pub struct UserResponse {
    success: bool,
    user: PublicUser,
}

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<Json<UserResponse>, ApiError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".to_owned(),
        ));
    }

    let user = state.store.with_exclusive(|data| {
        data.register_user(body.username, body.password, Utc::now())
            .map(PublicUser::from)
    })?;
    info!(user_id = user.id, username = %user.username, "user registered");
    persist(&state.store).await;

    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .snapshot()
        .authenticate(&body.username, &body.password)
        .map(PublicUser::from)
        .ok_or(ApiError::Unauthorized("Invalid username or password"))?;

    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(state.store.snapshot().stats())
}

pub async fn game_data(
    State(state): State<Arc<AppState>>,
    ApiJson(report): ApiJson<GameDataReport>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let now = Utc::now();
    let coins = state
        .store
        .with_bot(&report.username, |bot| {
            ingest::apply(bot, &report.data, now);
            bot.coin
        })
        .ok_or(ApiError::NotFound("Bot not found"))?;

    info!(bot = %report.username, coins, "bot update ok");
    debug!(
        bot = %report.username,
        game_user_id = report.data.player.user_id,
        categories = report.data.inventory.len(),
        "game data applied"
    );

    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    #[serde(rename = "userId")]
    user_id: i64,
}

#[derive(Serialize)]
pub struct BotsResponse {
    bots: Vec<Bot>,
}

pub async fn list_bots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Json<BotsResponse> {
    let bots = state
        .store
        .snapshot()
        .bots_for_user(query.user_id)
        .cloned()
        .collect();

    Json(BotsResponse { bots })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBotRequest {
    user_id: i64,
    name: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    game_id: String,
}

#[derive(Serialize)]
pub struct BotResponse {
    success: bool,
    bot: Bot,
}

pub async fn add_bot(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<AddBotRequest>,
) -> Result<Json<BotResponse>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Bot name is required".to_owned()));
    }

    // Saved by the periodic saver.
    let bot = state.store.with_exclusive(|data| {
        let id = data.next_bot_id(Utc::now());
        let bot = Bot::new(id, body.user_id, body.name, body.token, body.game_id);
        data.insert_bot(bot).clone()
    });
    info!(bot_id = bot.id, bot = %bot.name, user_id = bot.user_id, "bot added");

    Ok(Json(BotResponse { success: true, bot }))
}

pub async fn delete_bot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let removed = state
        .store
        .with_exclusive(|data| data.remove_bot(id))
        .ok_or(ApiError::NotFound("Bot not found"))?;
    info!(bot_id = id, bot = %removed.name, "bot deleted");

    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    user_id: i64,
    username: String,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SettingsRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if body.username.trim().is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_owned()));
    }

    let user = state
        .store
        .with_exclusive(|data| {
            data.rename_user(body.user_id, body.username)
                .map(|user| user.map(PublicUser::from))
        })?
        .ok_or(ApiError::NotFound("User not found"))?;
    persist(&state.store).await;

    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    user_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    success: bool,
    api_key: String,
}

pub async fn regenerate_api_key(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let api_key = state
        .store
        .with_exclusive(|data| data.rotate_api_key(body.user_id).map(str::to_owned))
        .ok_or(ApiError::NotFound("User not found"))?;
    info!(user_id = body.user_id, "api key rotated");
    persist(&state.store).await;

    Ok(Json(ApiKeyResponse {
        success: true,
        api_key,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    async fn app() -> (TempDir, Arc<AppState>, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("database.json"))
            .await
            .unwrap();
        let state = Arc::new(AppState::new(store));
        let router = router(Arc::clone(&state));
        (dir, state, router)
    }

    /// Send a request and return (status, JSON body).
    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn register(app: &Router, username: &str) -> i64 {
        let (status, body) = send(
            app,
            "POST",
            "/api/register",
            Some(json!({ "username": username, "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["user"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (dir, state, app) = app().await;
        register(&app, "carol").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/register",
            Some(json!({ "username": "carol", "password": "other" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username already exists");
        assert_eq!(state.store.snapshot().users().len(), 1);

        // Registration is saved immediately, password included.
        let on_disk = std::fs::read_to_string(dir.path().join("database.json")).unwrap();
        assert!(on_disk.contains("\"carol\""));
        assert!(on_disk.contains("\"password\": \"pw\""));
    }

    #[tokio::test]
    async fn malformed_body_gets_json_error() {
        let (_dir, state, app) = app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/register")
            .header("content-type", "application/json")
            .body(Body::from("{\"username\": "))
            .unwrap();
        let resp = app.clone().oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Invalid body" }));

        // Missing content type and wrong field types take the same path.
        let request = Request::builder()
            .method("POST")
            .uri("/api/gamedata")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.clone().oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/api/bots",
            Some(json!({ "userId": "not a number", "name": "Alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid body");
        assert!(state.store.snapshot().bots().is_empty());
    }

    #[tokio::test]
    async fn login_checks_password_and_hides_it() {
        let (_dir, _state, app) = app().await;
        register(&app, "carol").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            Some(json!({ "username": "carol", "password": "pw" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["user"].get("password").is_none());
        assert!(body["user"]["apiKey"].as_str().unwrap().starts_with("ts_"));

        let (status, _) = send(
            &app,
            "POST",
            "/api/login",
            Some(json!({ "username": "carol", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn game_data_updates_bot_found_by_name() {
        let (_dir, _state, app) = app().await;
        let user_id = register(&app, "carol").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/bots",
            Some(json!({ "userId": user_id, "name": "Alice", "token": "t", "gameId": "g" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bot"]["coin"], 0);
        assert_eq!(body["bot"]["status"], "offline");

        let (status, _) = send(
            &app,
            "POST",
            "/api/gamedata",
            Some(json!({ "username": "Alice", "data": { "Player": { "Coins": 500 } } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", &format!("/api/bots?userId={user_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let bots = body["bots"].as_array().unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0]["coin"], 500);
        assert_eq!(bots[0]["status"], "online");
        assert!(bots[0]["lastUpdate"].is_string());

        let (_, stats) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(
            stats,
            json!({ "totalUsers": 1, "totalBots": 1, "totalCoins": 500, "totalFish": 0 })
        );

        let (status, body) = send(
            &app,
            "POST",
            "/api/gamedata",
            Some(json!({ "username": "Nobody", "data": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Bot not found");
    }

    #[tokio::test]
    async fn delete_bot_removes_it_from_lookup() {
        let (_dir, state, app) = app().await;
        let (_, body) = send(
            &app,
            "POST",
            "/api/bots",
            Some(json!({ "userId": 1, "name": "Alice" })),
        )
        .await;
        let bot_id = body["bot"]["id"].as_i64().unwrap();

        let (status, _) = send(&app, "DELETE", &format!("/api/bots/{bot_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.store.snapshot().bot_by_name("Alice").is_none());

        let (status, _) = send(&app, "DELETE", &format!("/api/bots/{bot_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_and_api_key_rotation() {
        let (_dir, state, app) = app().await;
        let carol = register(&app, "carol").await;
        register(&app, "dave").await;

        let (status, _) = send(
            &app,
            "PUT",
            "/api/user/settings",
            Some(json!({ "userId": carol, "username": "dave" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/user/settings",
            Some(json!({ "userId": carol, "username": "caroline" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "caroline");

        let old_key = state.store.snapshot().user(carol).unwrap().api_key.clone();
        let (status, body) = send(
            &app,
            "POST",
            "/api/user/apikey",
            Some(json!({ "userId": carol })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let new_key = body["apiKey"].as_str().unwrap();
        assert_ne!(new_key, old_key);
        assert_eq!(state.store.snapshot().user(carol).unwrap().api_key, new_key);

        let (status, _) = send(
            &app,
            "POST",
            "/api/user/apikey",
            Some(json!({ "userId": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
