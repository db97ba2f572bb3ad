//! Input validation for the login, registration and admin login forms.
//!
//! Runs before any network call so obviously bad input never reaches the
//! backend.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Minimum admin username length
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Email pattern accepted by the backend forms, case-insensitive.
/// The pattern is a constant, so failing to compile it is a programming error.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$")
        .expect("EMAIL_REGEX is a valid regex pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Email + password form used for login and registration.
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: &str, password: String) -> Self {
        Self {
            email: email.trim().to_string(),
            password,
        }
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.email.is_empty() {
            errors.push(FieldError {
                field: "email",
                message: "Email is required",
            });
        } else if !is_valid_email(&self.email) {
            errors.push(FieldError {
                field: "email",
                message: "Invalid email address",
            });
        }

        if self.password.is_empty() {
            errors.push(FieldError {
                field: "password",
                message: "Password is required",
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminLoginForm {
    pub username: String,
    pub password: String,
}

impl AdminLoginForm {
    pub fn new(username: &str, password: String) -> Self {
        Self {
            username: username.trim().to_string(),
            password,
        }
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.username.is_empty() {
            errors.push(FieldError {
                field: "username",
                message: "Username is required",
            });
        } else if self.username.chars().count() < MIN_USERNAME_LENGTH {
            errors.push(FieldError {
                field: "username",
                message: "At least 3 characters",
            });
        }

        if self.password.is_empty() {
            errors.push(FieldError {
                field: "password",
                message: "Password is required",
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `local@host.tld` with a top-level domain of at least two letters.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Join field errors into one line for display.
pub fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("First.Last+books@mail.example.co.uk"));
        assert!(is_valid_email("x_y%z@sub-domain.io"));
        assert!(is_valid_email("UPPER@EXAMPLE.COM"));

        assert!(!is_valid_email(""));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b.c"));
        assert!(!is_valid_email("a@b.c0m"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a@b@c.com"));
    }

    #[test]
    fn test_login_form_validation() {
        assert!(LoginForm::new("a@b.com", "pw".to_string()).validate().is_ok());

        let errors = LoginForm::new("  ", String::new()).validate().unwrap_err();
        assert_eq!(describe(&errors), "Email is required; Password is required");

        let errors = LoginForm::new("not-an-email", "pw".to_string())
            .validate()
            .unwrap_err();
        assert_eq!(errors[0].field, "email");
        assert_eq!(errors[0].message, "Invalid email address");
    }

    #[test]
    fn test_admin_form_validation() {
        assert!(AdminLoginForm::new("admin", "pw".to_string()).validate().is_ok());

        let errors = AdminLoginForm::new("ab", "pw".to_string()).validate().unwrap_err();
        assert_eq!(errors, vec![FieldError { field: "username", message: "At least 3 characters" }]);

        let errors = AdminLoginForm::new("", String::new()).validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
