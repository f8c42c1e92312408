use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use minijinja::context;
use tracing::{info, instrument, warn};

use crate::{
    auth::extractors::CurrentUser,
    error::AppError,
    secrets::{dto::SubmitForm, services},
    state::AppState,
    views,
};

pub fn secrets_routes() -> Router<AppState> {
    Router::new()
        .route("/secrets", get(list_secrets))
        .route("/submit", get(submit_page).post(submit_secret))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_secrets(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Html<String>, AppError> {
    let secrets = services::board(state.users.as_ref()).await?;
    views::render("secrets.html", context! { signed_in => true, secrets => secrets })
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn submit_page(CurrentUser(user): CurrentUser) -> Result<Html<String>, AppError> {
    views::render("submit.html", context! { signed_in => true })
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn submit_secret(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<SubmitForm>,
) -> Result<Response, AppError> {
    match services::post_secret(state.users.as_ref(), user.id, &form.secret).await {
        Ok(Some(_)) => {
            info!("secret updated");
            Ok(Redirect::to("/secrets").into_response())
        }
        Ok(None) => {
            warn!("user vanished before the secret was saved");
            Ok(Redirect::to("/login").into_response())
        }
        Err(e @ AppError::Validation(_)) => {
            let page = views::render(
                "submit.html",
                context! { signed_in => true, error => e.public_message(), secret => form.secret },
            )?;
            Ok((e.status(), page).into_response())
        }
        Err(e) => Err(e),
    }
}
