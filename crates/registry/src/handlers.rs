//! Registry HTTP 处理器

use crate::{
    error::{RegistryError, RegistryResult},
    password,
    storage::RegistryStorage,
    types::{
        Address, AddressRequest, AuthResponse, CreateUserRequest, Credentials, LoginRequest,
        NewUser, User,
    },
    validation,
};
use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use gate::{AdmissionGate, AuthenticatedUser, CanonicalMessage, SharedSecret};
use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::time::Instant;
use tracing::{debug, info, warn};

lazy_static! {
    /// Registry 服务指标
    static ref REGISTRY_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("request_duration_seconds", "HTTP request duration in seconds")
            .namespace("addrbook")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["service", "method", "path", "status"]
    ).unwrap();

    static ref REGISTRY_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("requests_total", "Total number of HTTP requests")
            .namespace("addrbook"),
        &["service", "method", "path", "status"]
    ).unwrap();

    static ref REGISTRY_USERS_CREATED: IntCounterVec = IntCounterVec::new(
        Opts::new("users_created_total", "Total number of users created")
            .namespace("addrbook"),
        &["status"]
    ).unwrap();

    static ref REGISTRY_LOGINS: IntCounterVec = IntCounterVec::new(
        Opts::new("logins_total", "Total number of login attempts")
            .namespace("addrbook"),
        &["status"]
    ).unwrap();
}

/// 注册 Registry metrics 到全局 registry
pub fn register_registry_metrics(
    registry: &prometheus::Registry,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(REGISTRY_REQUEST_DURATION.clone()))?;
    registry.register(Box::new(REGISTRY_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(REGISTRY_USERS_CREATED.clone()))?;
    registry.register(Box::new(REGISTRY_LOGINS.clone()))?;
    Ok(())
}

/// 记录一次请求的耗时和状态
fn observe<T>(path: &str, start_time: Instant, result: &RegistryResult<T>, ok: StatusCode) {
    let status = match result {
        Ok(_) => ok.as_u16(),
        Err(e) => error_status(e).as_u16(),
    }
    .to_string();

    let labels = ["registry", "POST", path, status.as_str()];
    REGISTRY_REQUEST_DURATION
        .with_label_values(&labels)
        .observe(start_time.elapsed().as_secs_f64());
    REGISTRY_REQUESTS_TOTAL.with_label_values(&labels).inc();
}

fn error_status(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::Validation(_) | RegistryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RegistryError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        RegistryError::Conflict(_) => StatusCode::CONFLICT,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Registry 服务状态
#[derive(Clone)]
pub struct RegistryState {
    pub storage: RegistryStorage,
    /// 用于签发登录响应
    pub secret: SharedSecret,
}

impl RegistryState {
    pub fn new(storage: RegistryStorage, secret: SharedSecret) -> Self {
        Self { storage, secret }
    }
}

/// 打开存储并创建 RegistryState
pub async fn create_registry_state(
    sqlite_path: &std::path::Path,
    secret: SharedSecret,
) -> RegistryResult<RegistryState> {
    info!("Initializing registry state");
    let storage = RegistryStorage::open_sqlite(sqlite_path).await?;
    Ok(RegistryState::new(storage, secret))
}

/// 创建 Registry 服务的路由
///
/// `/users/create`、`/users/login`、`/health` 公开；其余路由经过签名准入
pub fn create_router(state: RegistryState, gate: AdmissionGate) -> Router {
    let public = Router::new()
        .route("/users/create", post(create_user_handler))
        .route("/users/login", post(login_handler))
        .route("/health", get(health_check_handler));

    let protected = gate::protect(
        Router::new()
            .route("/users/get", post(get_user_handler))
            .route("/address/create", post(create_address_handler))
            .route("/address/update", post(update_address_handler)),
        gate,
    );

    public.merge(protected).with_state(state)
}

/// 解析 JSON 请求体，错误统一转换为 `InvalidRequest`
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> RegistryResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| RegistryError::InvalidRequest(format!("Invalid request body: {}", e.body_text())))
}

async fn run_blocking<T, F>(task: F) -> RegistryResult<T>
where
    F: FnOnce() -> RegistryResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RegistryError::Internal(format!("Blocking task failed: {e}")))?
}

async fn create_user_handler(
    State(app_state): State<RegistryState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> RegistryResult<(StatusCode, Json<User>)> {
    let start_time = Instant::now();
    let result = create_user(&app_state, payload).await;
    observe("/users/create", start_time, &result, StatusCode::CREATED);

    let status = if result.is_ok() { "success" } else { "failure" };
    REGISTRY_USERS_CREATED.with_label_values(&[status]).inc();

    result.map(|user| (StatusCode::CREATED, Json(user)))
}

async fn create_user(
    app_state: &RegistryState,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> RegistryResult<User> {
    let request = parse_body(payload)?;
    info!("Received user creation request");

    validation::validate_name(&request.user_name)?;
    validation::validate_email(&request.user_email)?;
    validation::validate_password(&request.user_password)?;

    let plain = request.user_password;
    let password_hash = run_blocking(move || password::hash_password(&plain)).await?;

    let user = app_state
        .storage
        .create_user(&NewUser {
            name: request.user_name,
            email: request.user_email,
            credentials: Credentials { password_hash },
        })
        .await?;

    info!("Created user with user_id: {}", user.id);
    Ok(user)
}

async fn login_handler(
    State(app_state): State<RegistryState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> RegistryResult<Json<AuthResponse>> {
    let start_time = Instant::now();
    let result = login(&app_state, payload).await;
    observe("/users/login", start_time, &result, StatusCode::OK);

    let status = match &result {
        Ok(_) => "success",
        Err(RegistryError::InvalidCredentials) => "invalid_credentials",
        Err(_) => "error",
    };
    REGISTRY_LOGINS.with_label_values(&[status]).inc();

    result.map(Json)
}

async fn login(
    app_state: &RegistryState,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> RegistryResult<AuthResponse> {
    let request = parse_body(payload)?;

    let Some((user, credentials)) = app_state
        .storage
        .find_user_by_email(&request.user_email)
        .await?
    else {
        debug!("Login failed: unknown email");
        return Err(RegistryError::InvalidCredentials);
    };

    let plain = request.user_password;
    let matches = run_blocking(move || {
        password::verify_password(&plain, &credentials.password_hash)
    })
    .await?;

    if !matches {
        warn!("Login failed for user_id: {}", user.id);
        return Err(RegistryError::InvalidCredentials);
    }

    let timestamp = gate::unix_now();
    let signature = gate::sign(
        &CanonicalMessage::for_login(user.id, timestamp),
        &app_state.secret,
    );

    info!("User {} logged in", user.id);
    Ok(AuthResponse {
        user_id: user.id,
        timestamp,
        signature,
    })
}

async fn get_user_handler(
    State(app_state): State<RegistryState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> RegistryResult<Json<User>> {
    let start_time = Instant::now();
    let result = app_state
        .storage
        .find_user_by_id(user_id)
        .await
        .and_then(|user| user.ok_or_else(|| RegistryError::NotFound("user not found".to_string())));
    observe("/users/get", start_time, &result, StatusCode::OK);

    result.map(Json)
}

async fn create_address_handler(
    State(app_state): State<RegistryState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> RegistryResult<(StatusCode, Json<Address>)> {
    let start_time = Instant::now();
    let result = create_address(&app_state, user_id, payload).await;
    observe("/address/create", start_time, &result, StatusCode::CREATED);

    result.map(|address| (StatusCode::CREATED, Json(address)))
}

async fn create_address(
    app_state: &RegistryState,
    user_id: i64,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> RegistryResult<Address> {
    let request = parse_body(payload)?;
    warn_foreign_user_id(&request, user_id);

    let fields = validation::validate_address(&request)?;
    let address = app_state.storage.create_address(user_id, &fields).await?;

    info!("Created address {} for user_id: {}", address.id, user_id);
    Ok(address)
}

async fn update_address_handler(
    State(app_state): State<RegistryState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> RegistryResult<Json<Address>> {
    let start_time = Instant::now();
    let result = update_address(&app_state, user_id, payload).await;
    observe("/address/update", start_time, &result, StatusCode::OK);

    result.map(Json)
}

async fn update_address(
    app_state: &RegistryState,
    user_id: i64,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> RegistryResult<Address> {
    let request = parse_body(payload)?;
    warn_foreign_user_id(&request, user_id);

    let fields = validation::validate_address(&request)?;
    let address = app_state
        .storage
        .update_address(user_id, &fields)
        .await?
        .ok_or_else(|| RegistryError::NotFound("address not found".to_string()))?;

    info!("Updated address {} for user_id: {}", address.id, user_id);
    Ok(address)
}

/// 请求体中的 user_id 不参与归属判断
fn warn_foreign_user_id(request: &AddressRequest, user_id: i64) {
    if let Some(claimed) = request.user_id
        && claimed != user_id
    {
        warn!(
            "Ignoring user_id {} in address body, authenticated user is {}",
            claimed, user_id
        );
    }
}

async fn health_check_handler(
    State(app_state): State<RegistryState>,
) -> RegistryResult<Json<serde_json::Value>> {
    debug!("Health check requested");

    let user_count = app_state.storage.user_count().await?;

    let response = serde_json::json!({
        "status": "healthy",
        "service": "registry",
        "backend": app_state.storage.backend_name(),
        "user_count": user_count,
        "timestamp": gate::unix_now()
    });

    Ok(Json(response))
}
