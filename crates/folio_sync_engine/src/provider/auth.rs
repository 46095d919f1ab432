//! Sign-in strategies for remote providers.
//!
//! The strategy is picked once at startup from the running [`Platform`].
//! The interactive flows themselves (browser redirect, native account
//! picker) live outside this crate; they hand over a token through
//! [`Credentials`], and the strategy checks that the token it needs is
//! there.

use crate::error::{SyncError, SyncResult};

/// Runtime platform, used to choose an [`AuthStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Browser build.
    Web,
    /// Android.
    Android,
    /// iOS.
    Ios,
    /// Desktop operating systems.
    Desktop,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }

    /// Short name written to the device registry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Desktop => std::env::consts::OS,
        }
    }
}

/// How a provider signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// OAuth redirect flow; needs an access token.
    WebOAuth,
    /// Native social login; needs an identity token.
    NativeSocial,
    /// Always signed in. For tests and local folders.
    Mock,
}

impl AuthStrategy {
    /// The strategy used on `platform`.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Web | Platform::Desktop => AuthStrategy::WebOAuth,
            Platform::Android | Platform::Ios => AuthStrategy::NativeSocial,
        }
    }

    /// The strategy for [`Platform::current`].
    pub fn for_current_platform() -> Self {
        Self::for_platform(Platform::current())
    }

    /// Signs in with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] if the token this strategy needs is
    /// missing or blank.
    pub fn sign_in(&self, credentials: &Credentials) -> SyncResult<AuthSession> {
        let token = match self {
            AuthStrategy::Mock => "mock".to_string(),
            AuthStrategy::WebOAuth => credentials
                .access_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| SyncError::auth("web sign-in needs an access token"))?,
            AuthStrategy::NativeSocial => credentials
                .id_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| SyncError::auth("native sign-in needs an identity token"))?,
        };
        Ok(AuthSession {
            strategy: *self,
            token,
        })
    }
}

/// Tokens handed over by the platform sign-in flow.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// OAuth access token.
    pub access_token: Option<String>,
    /// Identity token from a native account picker.
    pub id_token: Option<String>,
}

impl Credentials {
    /// Reads `FOLIO_ACCESS_TOKEN` and `FOLIO_ID_TOKEN`.
    pub fn from_env() -> Self {
        Self {
            access_token: std::env::var("FOLIO_ACCESS_TOKEN").ok(),
            id_token: std::env::var("FOLIO_ID_TOKEN").ok(),
        }
    }

    /// Credentials carrying an access token.
    pub fn access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            id_token: None,
        }
    }
}

/// A signed-in session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Strategy that produced the session.
    pub strategy: AuthStrategy,
    /// Bearer token.
    pub token: String,
}
