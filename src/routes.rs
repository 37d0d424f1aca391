//! The HTTP API.
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use recipe_backend_core::{
    CacheClient, CachedRecipes, NewRecipe, RecipeId, RecipeStore, RecipeUpdate, SessionError,
    SessionStore, Token, UserService, UserStore,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;
use tower_cookies::Cookies;

use crate::{
    error::{ApiError, FieldErrors},
    AuthManagerLayer, CookieConfig, CurrentSession,
};

/// Requests below this path skip session handling.
pub const HEALTH_PATH: &str = "/api/v1/health";

const RECIPES_PATH: &str = "/api/v1/recipes";

/// Titles and contents shorter than this are rejected.
pub const MIN_FIELD_LEN: usize = 5;

/// Accepted password lengths, in characters.
pub const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=50;

/// The payload stored for a signed-in visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// The visitor's email address.
    pub email: String,
}

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState<C, S, U> {
    /// Recipes, read through the cache.
    pub recipes: CachedRecipes<C, S>,

    /// User accounts.
    pub users: UserService<U>,

    /// Sessions.
    pub sessions: SessionStore<C>,

    /// The session cookie.
    pub cookie_config: Arc<CookieConfig>,
}

impl<C: Clone, S: Clone, U: Clone> Clone for AppState<C, S, U> {
    fn clone(&self) -> Self {
        Self {
            recipes: self.recipes.clone(),
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            cookie_config: self.cookie_config.clone(),
        }
    }
}

impl<C: CacheClient, S: RecipeStore, U: UserStore> AppState<C, S, U> {
    /// Assemble the state from its parts.
    pub fn new(
        recipes: CachedRecipes<C, S>,
        users: UserService<U>,
        sessions: SessionStore<C>,
        cookie_config: CookieConfig,
    ) -> Self {
        Self {
            recipes,
            users,
            sessions,
            cookie_config: Arc::new(cookie_config),
        }
    }
}

/// Build the application router, with the authentication middleware
/// installed on every route except the health check.
pub fn router<C, S, U>(state: AppState<C, S, U>) -> Router
where
    C: CacheClient,
    S: RecipeStore,
    U: UserStore,
{
    let auth_layer = AuthManagerLayer::<C, SessionData>::new(state.sessions.clone())
        .with_cookie_config(state.cookie_config.as_ref().clone())
        .with_bypass_prefix(HEALTH_PATH);

    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(RECIPES_PATH, post(create_recipe::<C, S, U>))
        .route(
            "/api/v1/recipes/:id",
            get(get_recipe::<C, S, U>)
                .put(update_recipe::<C, S, U>)
                .delete(delete_recipe::<C, S, U>),
        )
        .route("/api/v1/auth/signup", post(sign_up::<C, S, U>))
        .route("/api/v1/auth/signin", post(sign_in_with_password::<C, S, U>))
        .route("/api/v1/auth/session", get(current_session))
        .route("/api/v1/auth/signout", post(sign_out::<C, S, U>))
        .layer(auth_layer)
        .with_state(state)
}

/// Create a session for `payload` and set its cookie.
///
/// This is what a sign-in handler calls once it has verified the visitor's
/// credentials.
pub async fn sign_in<C, P>(
    sessions: &SessionStore<C>,
    cookies: &Cookies,
    cookie_config: &CookieConfig,
    payload: &P,
) -> Result<Token, SessionError>
where
    C: CacheClient,
    P: Serialize + ?Sized,
{
    let token = sessions.create(payload).await?;
    cookies.add(cookie_config.build_cookie(&token));
    tracing::debug!("signed in");
    Ok(token)
}

/// A JSON request body whose rejections are reported as [`ApiError`]s.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => Err(ApiError::UnsupportedMediaType),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

#[derive(Serialize)]
struct Data<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CreateRecipeBody {
    title: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UpdateRecipeBody {
    title: Option<String>,
    content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct SignUpBody {
    email: String,
    password: String,
    password_again: String,
}

#[derive(Debug, Deserialize)]
struct SignInBody {
    email: String,
    password: String,
}

fn validate(title: &str, content: &str) -> Result<(), ApiError> {
    let mut fields = FieldErrors::new();
    for (name, value) in [("title", title), ("content", content)] {
        if value.trim().chars().count() < MIN_FIELD_LEN {
            fields.insert(name, format!("must be at least {MIN_FIELD_LEN} characters long"));
        }
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(fields))
    }
}

fn validate_sign_up(body: &SignUpBody) -> Result<(), ApiError> {
    let mut fields = FieldErrors::new();
    if body.email.is_empty() {
        fields.insert("email", "must not be empty".to_string());
    } else if !is_email(&body.email) {
        fields.insert("email", "must be a valid email address".to_string());
    }

    let len = body.password.chars().count();
    if !PASSWORD_LEN.contains(&len) {
        fields.insert(
            "password",
            format!(
                "must be between {} and {} characters long",
                PASSWORD_LEN.start(),
                PASSWORD_LEN.end()
            ),
        );
    }
    if body.password != body.password_again {
        fields.insert("passwords", "should be the same".to_string());
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(fields))
    }
}

fn validate_sign_in(body: &SignInBody) -> Result<(), ApiError> {
    let mut fields = FieldErrors::new();
    for (name, value) in [("email", &body.email), ("password", &body.password)] {
        if value.is_empty() {
            fields.insert(name, "must not be empty".to_string());
        }
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(fields))
    }
}

// A single `@` between a non-empty local part and a dotted domain.
fn is_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    }
}

fn parse_id(raw: &str) -> Result<RecipeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid recipe id: {raw:?}")))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "available" }))
}

async fn create_recipe<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    JsonBody(body): JsonBody<CreateRecipeBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&body.title, &body.content)?;

    let id = state
        .recipes
        .create(NewRecipe {
            title: body.title,
            content: body.content,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("{RECIPES_PATH}/{id}"))],
        Json(Message {
            message: "recipe created",
        }),
    ))
}

async fn get_recipe<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let recipe = state.recipes.get_by_id(id).await?;
    Ok(Json(Data { data: recipe }))
}

async fn update_recipe<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateRecipeBody>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;

    // Absent fields keep their stored values.
    let (title, content) = match (body.title, body.content) {
        (Some(title), Some(content)) => (title, content),
        (title, content) => {
            let current = state.recipes.service().get_by_id(id).await?;
            (
                title.unwrap_or(current.title),
                content.unwrap_or(current.content),
            )
        }
    };
    validate(&title, &content)?;

    state
        .recipes
        .update_by_id(id, body.updated_at, RecipeUpdate { title, content })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn delete_recipe<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.recipes.delete_by_id(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sign_up<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    JsonBody(body): JsonBody<SignUpBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_sign_up(&body)?;
    state.users.sign_up(&body.email, &body.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(Message {
            message: "user account created",
        }),
    ))
}

async fn sign_in_with_password<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    cookies: Cookies,
    JsonBody(body): JsonBody<SignInBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_sign_in(&body)?;
    let user = state.users.sign_in(&body.email, &body.password).await?;

    let payload = SessionData { email: user.email };
    sign_in(&state.sessions, &cookies, &state.cookie_config, &payload).await?;

    Ok(Json(Message {
        message: "signed in",
    }))
}

async fn current_session(
    session: CurrentSession<SessionData>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = session.into_payload().ok_or(ApiError::Unauthenticated)?;
    Ok(Json(Data { data: payload }))
}

async fn sign_out<C: CacheClient, S: RecipeStore, U: UserStore>(
    State(state): State<AppState<C, S, U>>,
    session: CurrentSession<SessionData>,
    cookies: Cookies,
) -> Result<StatusCode, ApiError> {
    if let Some(token) = session.token() {
        // The cookie goes even if the cache keeps the session.
        cookies.remove(state.cookie_config.removal_cookie());
        state.sessions.delete(token).await?;
        tracing::debug!("signed out");
    }

    Ok(StatusCode::NO_CONTENT)
}
