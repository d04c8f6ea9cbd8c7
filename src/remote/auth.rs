use std::sync::mpsc;

use crate::model::User;

/// Error from the authentication provider, carrying the provider's own
/// error code (e.g. `auth/wrong-password`).
#[derive(Debug, Clone, thiserror::Error)]
#[error("auth error {code}: {message}")]
pub struct AuthError {
    pub code: String,
    pub message: String,
}

impl AuthError {
    pub fn new(code: &str, message: &str) -> AuthError {
        AuthError {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Map the provider code to a user-facing message. Unmapped codes get a
    /// generic fallback; the raw code stays available for logging.
    pub fn friendly_message(&self) -> &'static str {
        match self.code.as_str() {
            "auth/user-not-found" | "auth/wrong-password" => "Invalid email or password.",
            "auth/email-already-in-use" => "An account with this email already exists.",
            "auth/weak-password" => "Password must be at least 6 characters.",
            "auth/invalid-email" => "Please enter a valid email address.",
            _ => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Session change event: `Some` on sign-in, `None` on sign-out. The
/// provider fires at least one event at startup.
pub type SessionEvent = Option<User>;

/// The external authentication service
pub trait AuthProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Create an account. Does not update the public user document; the
    /// engine writes that through the document store.
    fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Update the signed-in user's auth profile. `None` leaves a field
    /// untouched.
    fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<(), AuthError>;

    fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    fn sign_out(&self);

    /// Channel of session changes. Called once by the application root.
    fn session_events(&self) -> mpsc::Receiver<SessionEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_friendly_messages() {
        let err = AuthError::new("auth/wrong-password", "INVALID_PASSWORD");
        assert_eq!(err.friendly_message(), "Invalid email or password.");
        let err = AuthError::new("auth/weak-password", "WEAK_PASSWORD");
        assert_eq!(err.friendly_message(), "Password must be at least 6 characters.");
    }

    #[test]
    fn unknown_code_falls_back() {
        let err = AuthError::new("auth/too-many-requests", "rate limited");
        assert_eq!(
            err.friendly_message(),
            "An unexpected error occurred. Please try again."
        );
    }
}
