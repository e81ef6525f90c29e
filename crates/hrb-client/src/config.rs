//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can talk to a local development
//! server with zero configuration.

use hrb_shared::constants::IMAGES_PER_PAGE;
use hrb_shared::Permission;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote store.
    /// Env: `HRB_SERVER_URL`
    /// Default: `http://localhost:8080`
    pub server_url: String,

    /// Session token appended to every location as `auth=`.
    /// Env: `HRB_AUTH`
    /// Default: none
    pub auth_token: Option<String>,

    /// Name of the logged-in user, if any.
    /// Env: `HRB_USER`
    /// Default: none (anonymous, public listing)
    pub username: Option<String>,

    /// Permission applied to newly uploaded blobs until the user picks
    /// another one.
    /// Env: `HRB_DEFAULT_PERM` (private/shared/public)
    /// Default: `private`
    pub default_permission: Permission,

    /// Entries per directory page.
    /// Env: `HRB_IMAGES_PER_PAGE`
    /// Default: `100`
    pub images_per_page: usize,

    /// Capacity of the notification channel.
    /// Env: `HRB_NOTIFY_BUFFER`
    /// Default: `256`
    pub notification_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            auth_token: None,
            username: None,
            default_permission: Permission::Private,
            images_per_page: IMAGES_PER_PAGE,
            notification_buffer: 256,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("HRB_SERVER_URL") {
            config.server_url = url.trim_end_matches('/').to_string();
        }

        if let Some(token) = lookup("HRB_AUTH") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }

        if let Some(user) = lookup("HRB_USER") {
            if !user.is_empty() {
                config.username = Some(user);
            }
        }

        if let Some(perm) = lookup("HRB_DEFAULT_PERM") {
            match perm.parse() {
                Ok(parsed) => config.default_permission = parsed,
                Err(e) => {
                    tracing::warn!(value = %perm, error = %e, "Invalid HRB_DEFAULT_PERM, using default");
                }
            }
        }

        if let Some(val) = lookup("HRB_IMAGES_PER_PAGE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.images_per_page = n,
                _ => tracing::warn!(value = %val, "Invalid HRB_IMAGES_PER_PAGE, using default"),
            }
        }

        if let Some(val) = lookup("HRB_NOTIFY_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.notification_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid HRB_NOTIFY_BUFFER, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}
