use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, instrument, warn};

use crate::{
    avatars,
    error::ApiError,
    mailer::verification_email,
    state::AppState,
};

use super::{
    dto::{
        AvatarResponse, LoginRequest, LoginResponse, MessageResponse, PublicUser,
        RegisterRequest, RegisterResponse, ResendVerifyRequest, UpdateSubscriptionRequest,
    },
    extractors::CurrentUser,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::{self, NewUser},
    repo_types::User,
    validate,
};

const VERIFICATION_TOKEN_LEN: usize = 21;

/// Routes that need no authentication.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify/:verification_token", get(verify_email))
        .route("/verify", post(resend_verify))
        .route("/login", post(login))
}

/// Routes operating on the authenticated caller.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/current", get(current_user))
        .route("/subscription", patch(update_subscription))
        .route("/avatar", patch(update_avatar))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}

/// Opaque single-use token embedded in the verification link.
fn generate_verification_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    validate::validate_register(&payload)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::conflict("Email is already in use"));
    }

    let avatar_url = avatars::gravatar_url(&payload.email);
    let password_hash = hash_password(&payload.password)?;
    let verification_token = generate_verification_token();

    let new_user = NewUser {
        name: &payload.name,
        email: &payload.email,
        password_hash: &password_hash,
        avatar_url: &avatar_url,
        verification_token: &verification_token,
    };
    let user = match User::create(&state.db, &new_user).await {
        Ok(u) => u,
        // Two concurrent registrations can both pass the lookup above; the
        // unique index on email decides the loser.
        Err(e) if repo::is_unique_violation(&e) => {
            warn!(email = %payload.email, "email already registered");
            return Err(ApiError::conflict("Email is already in use"));
        }
        Err(e) => return Err(e.into()),
    };

    // Sent only after the row is durably created.
    let (subject, html) = verification_email(&state.config.app_base_url, &verification_token);
    state.mailer.send(&user.email, &subject, &html).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(verification_token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = match User::find_by_verification_token(&state.db, &verification_token).await? {
        Some(u) if !u.verify => u,
        _ => {
            warn!("unknown or already consumed verification token");
            return Err(ApiError::not_found(
                "Not found or verification has already been passed",
            ));
        }
    };

    User::mark_verified(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse {
        message: "Verification successful".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_verify(
    State(state): State<AppState>,
    Json(mut payload): Json<ResendVerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    validate::validate_resend(&payload)?;

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "resend for unknown email");
            return Err(ApiError::bad_request(
                "User with email not found or email is wrong",
            ));
        }
    };
    if user.verify {
        return Err(ApiError::bad_request("Verification has already been passed"));
    }

    let token = user
        .verification_token
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("unverified user {} has no verification token", user.id))?;

    let (subject, html) = verification_email(&state.config.app_base_url, token);
    state.mailer.send(&user.email, &subject, &html).await?;

    info!(user_id = %user.id, "verification email resent");
    Ok(Json(MessageResponse {
        message: "Verification email sent".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    validate::validate_login(&payload)?;

    // Same message for an unknown email and a wrong password.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::unauthorized("Email or password is wrong"));
        }
    };
    if !user.verify {
        warn!(user_id = %user.id, "login before verification");
        return Err(ApiError::unauthorized("Email not verify"));
    }
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Email or password is wrong"));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    User::set_token(&state.db, user.id, Some(&token)).await?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, ApiError> {
    User::set_token(&state.db, user.0.id, None).await?;
    info!("user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(user), fields(user_id = %user.0.id))]
pub async fn current_user(user: CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user.0))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.0.id))]
pub async fn update_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let subscription = validate::validate_subscription(&payload)?;
    User::set_subscription(&state.db, user.0.id, subscription).await?;

    info!(%subscription, "subscription changed");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!(
                "User {} subscription changed to {}",
                user.0.email, subscription
            ),
        }),
    ))
}

#[instrument(skip(state, user, multipart), fields(user_id = %user.0.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "malformed multipart body");
        ApiError::bad_request("File not found")
    })? {
        if field.name() == Some("avatar") {
            upload = Some(field.bytes().await.map_err(|e| {
                warn!(error = %e, "failed to read avatar upload");
                ApiError::bad_request("File not found")
            })?);
            break;
        }
    }
    let Some(data) = upload else {
        return Err(ApiError::bad_request("File not found"));
    };

    // Resize and store before touching the user row; a broken upload leaves
    // the previous avatar in place.
    let body = avatars::render_square_jpeg(&data).map_err(|e| {
        warn!(error = %e, "avatar is not a decodable image");
        ApiError::bad_request("File is not a supported image")
    })?;
    let avatar_url = avatars::store_avatar(&state, user.0.id, body).await?;
    User::set_avatar_url(&state.db, user.0.id, &avatar_url).await?;

    info!(%avatar_url, "avatar updated");
    Ok(Json(AvatarResponse { avatar_url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_tokens_are_opaque_and_distinct() {
        let a = generate_verification_token();
        let b = generate_verification_token();
        assert_eq!(a.len(), VERIFICATION_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
