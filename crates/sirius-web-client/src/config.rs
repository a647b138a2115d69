//! Externalized client settings.
//!
//! Settings come from a TOML document and may be overridden by environment
//! variables, so credentials never have to live in code:
//!
//! ```toml
//! http_origin = "https://sirius.example.com"
//! ws_origin = "wss://sirius.example.com"
//! username = "system"
//! password = "..."
//! protocol = "graphql-ws"
//! request_timeout_secs = 30
//!
//! [reconnect]
//! max_attempts = 10
//! initial_delay = 500
//!
//! [default_options]
//! query = "no-cache"
//! ```
//!
//! | Variable             | Overrides     |
//! |----------------------|---------------|
//! | `SIRIUS_HTTP_ORIGIN` | `http_origin` |
//! | `SIRIUS_WS_ORIGIN`   | `ws_origin`   |
//! | `SIRIUS_USERNAME`    | `username`    |
//! | `SIRIUS_PASSWORD`    | `password`    |

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::credentials::CredentialHeader;
use crate::error::{ClientError, Result};
use crate::graphql::{ClientConfiguration, DefaultOptions, WebSocketProtocol};
use crate::websocket::ReconnectConfig;

const TARGET: &str = "sirius_web_client::config";

/// Environment variable overriding `http_origin`.
pub const ENV_HTTP_ORIGIN: &str = "SIRIUS_HTTP_ORIGIN";
/// Environment variable overriding `ws_origin`.
pub const ENV_WS_ORIGIN: &str = "SIRIUS_WS_ORIGIN";
/// Environment variable overriding `username`.
pub const ENV_USERNAME: &str = "SIRIUS_USERNAME";
/// Environment variable overriding `password`.
pub const ENV_PASSWORD: &str = "SIRIUS_PASSWORD";

/// Client settings as read from a file or the environment.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    /// Origin of the HTTP endpoint, e.g. `https://host:8080`.
    pub http_origin: Option<String>,
    /// Origin of the subscription endpoint. Derived from `http_origin` when absent.
    pub ws_origin: Option<String>,
    /// Basic auth user name.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Subscription subprotocol.
    pub protocol: WebSocketProtocol,
    /// HTTP request timeout in seconds; `0` disables it.
    pub request_timeout_secs: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Subscription socket reconnection policy.
    pub reconnect: ReconnectConfig,
    /// Fetch policies.
    pub default_options: DefaultOptions,
    /// HTTP user agent override.
    pub user_agent: Option<String>,
}

impl ClientSettings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ClientError::io(path, e))?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!(target: TARGET, path = %path.display(), "loaded client settings");
        Ok(settings)
    }

    /// Settings from environment variables alone.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a lookup function keyed by the `SIRIUS_*` names.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fields = [
            (ENV_HTTP_ORIGIN, &mut self.http_origin),
            (ENV_WS_ORIGIN, &mut self.ws_origin),
            (ENV_USERNAME, &mut self.username),
            (ENV_PASSWORD, &mut self.password),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                tracing::trace!(target: TARGET, variable = key, "setting overridden");
                *field = Some(value);
            }
        }
        self
    }

    /// Build a client configuration.
    ///
    /// Fails with [`ClientError::Config`] when the origin or credentials are
    /// missing.
    pub fn into_configuration(self) -> Result<ClientConfiguration> {
        let http_origin = self
            .http_origin
            .ok_or_else(|| missing("http_origin", ENV_HTTP_ORIGIN))?;
        let ws_origin = match self.ws_origin {
            Some(origin) => origin,
            None => http_to_ws_origin(&http_origin)?,
        };
        let username = self.username.ok_or_else(|| missing("username", ENV_USERNAME))?;
        let password = self.password.ok_or_else(|| missing("password", ENV_PASSWORD))?;

        let mut configuration = ClientConfiguration::from_origins(
            &http_origin,
            &ws_origin,
            CredentialHeader::basic(&username, &password),
        )?
        .with_protocol(self.protocol)
        .with_reconnect(Some(self.reconnect))
        .with_default_options(self.default_options);

        if let Some(secs) = self.request_timeout_secs {
            configuration = configuration
                .with_request_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Some(secs) = self.connect_timeout_secs {
            configuration = configuration.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(user_agent) = self.user_agent {
            configuration = configuration.with_user_agent(user_agent);
        }
        Ok(configuration)
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("http_origin", &self.http_origin)
            .field("ws_origin", &self.ws_origin)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("protocol", &self.protocol)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("reconnect", &self.reconnect)
            .field("default_options", &self.default_options)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

fn missing(field: &str, variable: &str) -> ClientError {
    ClientError::Config(format!("missing `{field}` (set it in the settings file or {variable})"))
}

fn http_to_ws_origin(origin: &str) -> Result<String> {
    if let Some(rest) = origin.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = origin.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(ClientError::Config(format!(
            "cannot derive ws_origin from `{origin}`"
        )))
    }
}
