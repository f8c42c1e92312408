use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};

use crate::{error::AppError, state::AppState, users::User};

async fn load_session_user(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let Some(token) = state.sessions.token_from(&jar) else {
        return Ok(None);
    };
    let Some(user_id) = state.sessions.resolve(&token).await? else {
        debug!("stale or unknown session cookie");
        return Ok(None);
    };
    let user = state.users.find_by_id(user_id).await?;
    if user.is_none() {
        warn!(%user_id, "session points at a missing user");
    }
    Ok(user)
}

/// The signed-in user. Anonymous requests are redirected to `/login`.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match load_session_user(parts, state).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(Redirect::to("/login").into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}

/// The signed-in user when there is one; used for navigation only, so
/// lookup failures degrade to anonymous.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match load_session_user(parts, state).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                warn!(error = %e, "session lookup failed; treating request as anonymous");
                Ok(MaybeUser(None))
            }
        }
    }
}
