use futures_util::future::BoxFuture;

use crate::session::Identity;

/// Failure reported by the identity provider.
///
/// The `Display` text is for logs only; clients get [`AuthError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,
    #[error("wrong password")]
    WrongPassword,
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("invalid email")]
    InvalidEmail,
    #[error("email already registered")]
    EmailExists,
    #[error("weak password")]
    WeakPassword,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("email is required")]
    MissingEmail,
    #[error("identity provider rejected request: {0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// What the user was trying to do; selects the fallback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    Register,
    PasswordReset,
}

impl AuthError {
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "EMAIL_NOT_FOUND" => Self::UserNotFound,
            "INVALID_PASSWORD" => Self::WrongPassword,
            "INVALID_LOGIN_CREDENTIALS" => Self::InvalidCredentials,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "EMAIL_EXISTS" => Self::EmailExists,
            "WEAK_PASSWORD" => Self::WeakPassword,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyAttempts,
            "MISSING_EMAIL" => Self::MissingEmail,
            other => Self::Rejected(other.to_owned()),
        }
    }

    /// Short human-readable message. Never contains a provider error code.
    pub fn user_message(&self, action: AuthAction) -> &'static str {
        match (action, self) {
            (_, Self::InvalidEmail) => "Invalid email address",
            (_, Self::MissingEmail) => "Please enter your email first",
            (_, Self::TooManyAttempts) => "Too many attempts, try again later",
            (AuthAction::SignIn, Self::UserNotFound) => "User not found",
            (AuthAction::SignIn, Self::WrongPassword) => "Incorrect password",
            (AuthAction::SignIn, Self::InvalidCredentials) => "Incorrect email or password",
            (AuthAction::SignIn, _) => "Login failed",
            (AuthAction::Register, Self::EmailExists) => "Email already in use",
            (AuthAction::Register, Self::WeakPassword) => "Password is too weak",
            (AuthAction::Register, _) => "Registration failed",
            (AuthAction::PasswordReset, _) => "Failed to send reset email",
        }
    }
}

/// Email/password identity provider. Successful calls produce the
/// [`Identity`] handed to the session controller.
pub trait IdentityProvider: Send + Sync + 'static {
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>>;

    fn sign_up<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<Identity, AuthError>>;

    fn send_password_reset<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<(), AuthError>>;
}
