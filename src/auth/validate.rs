use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use super::dto::{LoginRequest, RegisterRequest, ResendVerifyRequest, UpdateSubscriptionRequest};
use super::repo_types::Subscription;
use crate::error::ApiError;

const MIN_PASSWORD_LEN: usize = 6;

/// A single failed field check.
#[derive(Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        let message = errors
            .iter()
            .map(FieldError::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::bad_request(message)
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    if email.is_empty() {
        errors.push(FieldError {
            field: "email",
            message: "is required".into(),
        });
    } else if !is_valid_email(email) {
        errors.push(FieldError {
            field: "email",
            message: "must be a valid email address".into(),
        });
    }
}

fn check_password(errors: &mut Vec<FieldError>, password: &str) {
    if password.len() < MIN_PASSWORD_LEN {
        errors.push(FieldError {
            field: "password",
            message: format!("must be at least {} characters", MIN_PASSWORD_LEN),
        });
    }
}

pub fn validate_register(req: &RegisterRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    if req.name.trim().is_empty() {
        errors.push(FieldError {
            field: "name",
            message: "is required".into(),
        });
    }
    check_email(&mut errors, &req.email);
    check_password(&mut errors, &req.password);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    check_email(&mut errors, &req.email);
    check_password(&mut errors, &req.password);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_resend(req: &ResendVerifyRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    check_email(&mut errors, &req.email);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks the requested plan is a member of the enum and returns it typed.
pub fn validate_subscription(
    req: &UpdateSubscriptionRequest,
) -> Result<Subscription, Vec<FieldError>> {
    req.subscription.parse().map_err(|_| {
        vec![FieldError {
            field: "subscription",
            message: "must be one of starter, pro, business".into(),
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn accepts_well_formed_registration() {
        assert!(validate_register(&register("A", "a@b.com", "secret1")).is_ok());
    }

    #[test]
    fn rejects_missing_name() {
        let errors = validate_register(&register("  ", "a@b.com", "secret1")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
    }

    #[test]
    fn rejects_bad_email_shapes() {
        for email in ["", "plain", "a@b", "a b@c.com", "a@b .com"] {
            let errors = validate_register(&register("A", email, "secret1")).unwrap_err();
            assert_eq!(errors[0].field, "email", "email {:?}", email);
        }
    }

    #[test]
    fn rejects_short_password() {
        let errors = validate_login(&LoginRequest {
            email: "a@b.com".into(),
            password: "five5".into(),
        })
        .unwrap_err();
        assert_eq!(errors[0].field, "password");
    }

    #[test]
    fn collects_all_field_errors_at_once() {
        let errors = validate_register(&register("", "nope", "x")).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn subscription_must_be_enum_member() {
        let ok = UpdateSubscriptionRequest {
            subscription: "pro".into(),
        };
        assert_eq!(validate_subscription(&ok).unwrap(), Subscription::Pro);

        let bad = UpdateSubscriptionRequest {
            subscription: "platinum".into(),
        };
        assert!(validate_subscription(&bad).is_err());
    }

    #[test]
    fn field_errors_render_as_bad_request() {
        let err = ApiError::from(vec![FieldError {
            field: "email",
            message: "is required".into(),
        }]);
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "email is required");
    }
}
