use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use minijinja::context;
use time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginForm, OAuthCallbackQuery, RegisterForm},
        extractors::MaybeUser,
        session::random_token,
    },
    error::AppError,
    state::AppState,
    views,
};

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_PATH: &str = "/auth/google";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/auth/google", get(google_start))
        .route("/auth/google/secrets", get(google_callback))
        .route("/logout", get(logout))
}

async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user_id: Uuid,
) -> Result<CookieJar, AppError> {
    let token = state.sessions.create(user_id).await?;
    Ok(jar.add(state.sessions.cookie(token)))
}

/// Re-renders a credentials form with the error and the submitted username.
fn form_with_error(
    template: &str,
    state: &AppState,
    username: &str,
    err: &AppError,
) -> Result<Response, AppError> {
    let page = views::render(
        template,
        context! {
            error => err.public_message(),
            username => username,
            google_enabled => state.google.is_some(),
        },
    )?;
    Ok((err.status(), page).into_response())
}

#[instrument(skip(state, user))]
pub async fn login_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Html<String>, AppError> {
    views::render(
        "login.html",
        context! { signed_in => user.is_some(), google_enabled => state.google.is_some() },
    )
}

#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match state
        .verifier
        .authenticate(&form.username, &form.password)
        .await
    {
        Ok(user) => {
            let jar = start_session(&state, jar, user.id).await?;
            Ok((jar, Redirect::to("/secrets")).into_response())
        }
        Err(e @ (AppError::InvalidCredentials | AppError::Validation(_))) => {
            form_with_error("login.html", &state, form.username.trim(), &e)
        }
        Err(e) => Err(e),
    }
}

#[instrument(skip(state, user))]
pub async fn register_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Html<String>, AppError> {
    views::render(
        "register.html",
        context! { signed_in => user.is_some(), google_enabled => state.google.is_some() },
    )
}

#[instrument(skip(state, jar, form))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    match state.verifier.register(&form.username, &form.password).await {
        Ok(user) => {
            let jar = start_session(&state, jar, user.id).await?;
            Ok((jar, Redirect::to("/secrets")).into_response())
        }
        Err(e @ (AppError::UsernameTaken | AppError::Validation(_))) => {
            warn!(error = %e, "registration rejected");
            form_with_error("register.html", &state, form.username.trim(), &e)
        }
        Err(e) => Err(e),
    }
}

/// Sends the browser to Google's consent page. The `state` value is pinned
/// in a short-lived cookie and checked on the way back.
#[instrument(skip(state, jar))]
pub async fn google_start(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(google) = state.google.as_ref() else {
        warn!("google login requested but not configured");
        return Redirect::to("/login").into_response();
    };

    let csrf = random_token(16);
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf.clone()))
        .path(OAUTH_STATE_PATH)
        .http_only(true)
        .secure(state.config.session.secure_cookie)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(10))
        .build();

    (jar.add(cookie), Redirect::to(&google.authorization_url(&csrf))).into_response()
}

#[instrument(skip(state, jar, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_owned());
    // the state is single use, whatever the outcome
    let jar = jar.remove(Cookie::build((OAUTH_STATE_COOKIE, "")).path(OAUTH_STATE_PATH));

    match finish_google_login(&state, jar.clone(), expected, query).await {
        Ok(done) => done.into_response(),
        Err(err) => (jar, err).into_response(),
    }
}

async fn finish_google_login(
    state: &AppState,
    jar: CookieJar,
    expected: Option<String>,
    query: OAuthCallbackQuery,
) -> Result<(CookieJar, Redirect), AppError> {
    let Some(google) = state.google.clone() else {
        return Err(AppError::OAuth("google login is not configured".into()));
    };
    if let Some(err) = query.error {
        return Err(AppError::OAuth(format!("provider returned {err}")));
    }
    match (expected.as_deref(), query.state.as_deref()) {
        (Some(want), Some(got)) if !want.is_empty() && want == got => {}
        _ => return Err(AppError::OAuth("state mismatch".into())),
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::OAuth("missing authorization code".into()))?;

    let identity = google
        .exchange_code(&code)
        .await
        .map_err(|e| AppError::OAuth(format!("{e:#}")))?;
    let user = state.verifier.find_or_create_external(&identity).await?;

    let jar = start_session(state, jar, user.id).await?;
    Ok((jar, Redirect::to("/secrets")))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    if let Some(token) = state.sessions.token_from(&jar) {
        state.sessions.destroy(&token).await?;
        info!("user logged out");
    }
    Ok((state.sessions.clear(jar), Redirect::to("/")))
}
