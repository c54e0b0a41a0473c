//! REST API layer using Axum.
//!
//! Routes live under `/api/v1`. Item routes read the token from the
//! `Authorization` header (raw or `Bearer <token>`) and check it before the
//! body is looked at. Writes answer 200 as soon as the command is queued.

use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::KeeperError;
use crate::models::{DeleteRequest, Item, ItemsResponse, TokenResponse, UserRequest};
use crate::queue::Command;
use crate::service::Keeper;

#[derive(OpenApi)]
#[openapi(
    paths(registration, authorization, get_all, set_item, update_item, delete_item),
    components(schemas(UserRequest, TokenResponse, Item, DeleteRequest, ItemsResponse)),
    info(title = "keeper", description = "Personal key/value store")
)]
pub struct ApiDoc;

impl IntoResponse for KeeperError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            error!("request failed: {}", self);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let status = match self {
            KeeperError::BadRequest(_) => StatusCode::BAD_REQUEST,
            KeeperError::UserConflict => StatusCode::CONFLICT,
            KeeperError::UserDataConflict | KeeperError::InvalidToken => StatusCode::FORBIDDEN,
            KeeperError::ExpiredToken => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.into_response()
    }
}

type ApiResult<T> = Result<T, KeeperError>;

/// Builds the router around a ready [`Keeper`].
pub fn create_router(keeper: Keeper) -> Router {
    let api = Router::new()
        .route("/registration", post(registration))
        .route("/auth", post(authorization))
        .route(
            "/items",
            get(get_all).post(set_item).patch(update_item).delete(delete_item),
        );

    Router::new()
        .nest("/api/v1", api)
        .merge(SwaggerUi::new("/api/v1/swagger").url("/api/v1/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(log_request))
        .with_state(keeper)
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;
    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Pulls the token out of the `Authorization` header.
fn bearer(headers: &HeaderMap) -> &str {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim();
    raw.strip_prefix("Bearer ").unwrap_or(raw)
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| KeeperError::BadRequest(rejection.body_text()))
}

#[utoipa::path(
    post,
    path = "/api/v1/registration",
    request_body = UserRequest,
    responses(
        (status = 200, description = "Registered", body = TokenResponse),
        (status = 400, description = "Invalid body"),
        (status = 409, description = "Login already taken"),
        (status = 500, description = "Internal error")
    )
)]
async fn registration(
    State(keeper): State<Keeper>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let request = parse_body(body)?;
    let token = keeper.register(&request)?;
    Ok(Json(TokenResponse { token }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth",
    request_body = UserRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 400, description = "Invalid body"),
        (status = 403, description = "Wrong login or password"),
        (status = 500, description = "Internal error")
    )
)]
async fn authorization(
    State(keeper): State<Keeper>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let request = parse_body(body)?;
    let token = keeper.login(&request)?;
    Ok(Json(TokenResponse { token }))
}

#[utoipa::path(
    get,
    path = "/api/v1/items",
    params(("Authorization" = String, Header, description = "Access token")),
    responses(
        (status = 200, description = "All items of the caller", body = ItemsResponse),
        (status = 401, description = "Expired token"),
        (status = 403, description = "Invalid token"),
        (status = 500, description = "Internal error")
    )
)]
async fn get_all(State(keeper): State<Keeper>, headers: HeaderMap) -> ApiResult<Json<ItemsResponse>> {
    let data = keeper.read_all(bearer(&headers))?;
    Ok(Json(ItemsResponse { data }))
}

#[utoipa::path(
    post,
    path = "/api/v1/items",
    request_body = Item,
    params(("Authorization" = String, Header, description = "Access token")),
    responses(
        (status = 200, description = "Queued"),
        (status = 400, description = "Invalid body"),
        (status = 401, description = "Expired token"),
        (status = 403, description = "Invalid token")
    )
)]
async fn set_item(
    State(keeper): State<Keeper>,
    headers: HeaderMap,
    body: Result<Json<Item>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let owner = keeper.authorize(bearer(&headers))?;
    keeper.submit(owner, Command::Set(parse_body(body)?)).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    patch,
    path = "/api/v1/items",
    request_body = Item,
    params(("Authorization" = String, Header, description = "Access token")),
    responses(
        (status = 200, description = "Queued"),
        (status = 400, description = "Invalid body"),
        (status = 401, description = "Expired token"),
        (status = 403, description = "Invalid token")
    )
)]
async fn update_item(
    State(keeper): State<Keeper>,
    headers: HeaderMap,
    body: Result<Json<Item>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let owner = keeper.authorize(bearer(&headers))?;
    keeper.submit(owner, Command::Update(parse_body(body)?)).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/api/v1/items",
    request_body = DeleteRequest,
    params(("Authorization" = String, Header, description = "Access token")),
    responses(
        (status = 200, description = "Queued"),
        (status = 400, description = "Invalid body"),
        (status = 401, description = "Expired token"),
        (status = 403, description = "Invalid token")
    )
)]
async fn delete_item(
    State(keeper): State<Keeper>,
    headers: HeaderMap,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let owner = keeper.authorize(bearer(&headers))?;
    keeper.submit(owner, Command::Delete(parse_body(body)?)).await?;
    Ok(StatusCode::OK)
}
