use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Subscription, User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for resending the verification email.
#[derive(Debug, Deserialize)]
pub struct ResendVerifyRequest {
    pub email: String,
}

/// Request body for changing the subscription plan. The value is validated
/// against the plan enum before the handler acts on it.
#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub subscription: String,
}

/// Public part of the user returned to the client. Never carries the
/// password hash or any token.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(rename = "avatarURL")]
    pub avatar_url: String,
    pub subscription: Subscription,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            avatar_url: u.avatar_url.clone(),
            subscription: u.subscription,
        }
    }
}

/// Response returned after registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: PublicUser,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    #[serde(rename = "avatarURL")]
    pub avatar_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@b.com".into(),
            password_hash: "$argon2id$fake".into(),
            avatar_url: "https://www.gravatar.com/avatar/abc".into(),
            subscription: Subscription::Starter,
            verify: false,
            verification_token: Some("tok".into()),
            token: Some("jwt".into()),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn public_user_exposes_only_public_fields() {
        let json = serde_json::to_value(PublicUser::from(&sample_user())).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("email"));
        assert!(obj.contains_key("avatarURL"));
        assert_eq!(obj["subscription"], "starter");
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("token"));
        assert!(!obj.contains_key("verification_token"));
    }

    #[test]
    fn user_row_never_serializes_secrets() {
        let json = serde_json::to_value(sample_user()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("token"));
    }

    #[test]
    fn avatar_response_uses_camel_case_key() {
        let json = serde_json::to_string(&AvatarResponse {
            avatar_url: "x".into(),
        })
        .unwrap();
        assert!(json.contains("avatarURL"));
    }
}
