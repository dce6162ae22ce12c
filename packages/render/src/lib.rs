#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static map rendering clients.
//!
//! [`MapRenderer`] resolves a [`MapRequest`] to a [`RenderedTile`].
//! Two backends are provided:
//!
//! - [`esri::EsriRenderer`]: ArcGIS Server `ExportWebMap`, a form POST that
//!   returns the URL of the rendered image.
//! - [`mapbox::MapboxRenderer`]: Mapbox Static Images API, a single GET.
//!
//! All HTTP goes through [`retry::RetryPolicy`], and every request has a
//! deadline set on the underlying `reqwest` client.

pub mod esri;
pub mod mapbox;
pub mod retry;

#[cfg(test)]
mod stub;

use std::time::Duration;

use uprn_maps_models::{Elevation, GroupKey, MapRequest, RenderedTile};
use uprn_maps_request::service_registry::{ProviderConfig, RegistryError, ServiceConfig};

pub use retry::RetryPolicy;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from a rendering service.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The service answered with a non-success status.
    #[error("Rendering service returned HTTP {status}: {body}")]
    Service {
        /// HTTP status (or the service's own error code).
        status: u16,
        /// Response body preview.
        body: String,
    },

    /// No response arrived before the deadline.
    #[error("Rendering service did not respond in time ({url})")]
    Timeout {
        /// Request URL, when known.
        url: String,
    },

    /// Transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response could not be understood.
    #[error("Unexpected response from rendering service: {0}")]
    Decode(String),

    /// The service configuration is unusable.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The render was abandoned because the run was cancelled.
    #[error("Render cancelled")]
    Cancelled,
}

/// A terminal render error with the group and level it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("Failed to render {} at {level}: {error}", target_label(.key.as_ref()))]
pub struct RenderFailure {
    /// Group of the failed request (`None` for the run-level overview).
    pub key: Option<GroupKey>,
    /// Elevation of the failed request.
    pub level: Elevation,
    /// What went wrong.
    #[source]
    pub error: RenderError,
}

impl RenderFailure {
    /// Attaches request context to `error`.
    #[must_use]
    pub fn new(request: &MapRequest, error: RenderError) -> Self {
        Self {
            key: request.key.clone(),
            level: request.elevation,
            error,
        }
    }
}

fn target_label(key: Option<&GroupKey>) -> String {
    key.map_or_else(|| "run overview".to_owned(), |k| format!("group {k}"))
}

/// Renders map requests to raster tiles.
#[async_trait::async_trait]
pub trait MapRenderer: Send + Sync {
    /// Renders one request. The request is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`RenderFailure`] carrying the request's group and level if
    /// the service fails after retries.
    async fn render(&self, request: MapRequest) -> Result<RenderedTile, RenderFailure>;
}

/// HTTP settings shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Per-request deadline.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientOptions {
    /// Builds a `reqwest` client with the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Http`] if the client cannot be built.
    pub fn client(&self) -> Result<reqwest::Client, RenderError> {
        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("uprn-maps/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

/// Creates the renderer described by `service`.
///
/// # Errors
///
/// Returns [`RenderError`] if the HTTP client cannot be built or a required
/// access token is missing.
pub fn create_renderer(
    service: &ServiceConfig,
    options: ClientOptions,
) -> Result<Box<dyn MapRenderer>, RenderError> {
    let client = options.client()?;

    match &service.provider {
        ProviderConfig::Esri {
            export_url,
            basemap_url,
            format,
            layout_template,
            label_font_size,
        } => {
            log::info!("Rendering with {} at {export_url}", service.name);
            Ok(Box::new(esri::EsriRenderer {
                client,
                retry: options.retry,
                export_url: export_url.clone(),
                basemap_url: basemap_url.clone(),
                format: format.clone(),
                layout_template: layout_template.clone(),
                label_font_size: *label_font_size,
            }))
        }
        ProviderConfig::Mapbox {
            base_url,
            style,
            token_env,
            max_dimension,
        } => {
            let Some(token) = service.access_token()? else {
                return Err(RegistryError::MissingToken {
                    service: service.id.clone(),
                    env: token_env.clone(),
                }
                .into());
            };
            log::info!("Rendering with {} ({style})", service.name);
            Ok(Box::new(mapbox::MapboxRenderer {
                client,
                retry: options.retry,
                base_url: base_url.trim_end_matches('/').to_owned(),
                style: style.clone(),
                access_token: token,
                max_dimension: *max_dimension,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use uprn_maps_request::ServiceKind;
    use uprn_maps_request::service_registry::builtin;

    use super::*;

    #[test]
    fn failure_message_names_group_and_level() {
        let failure = RenderFailure {
            key: Some(GroupKey::Postcode("AB1 2CD".to_owned())),
            level: Elevation(1750),
            error: RenderError::Service {
                status: 503,
                body: "down".to_owned(),
            },
        };
        assert_eq!(
            failure.to_string(),
            "Failed to render group AB1 2CD at 1:1750: Rendering service returned HTTP 503: down"
        );

        let overview = RenderFailure {
            key: None,
            level: Elevation(20_000),
            error: RenderError::Cancelled,
        };
        assert!(overview.to_string().starts_with("Failed to render run overview"));
    }

    #[test]
    fn creates_esri_renderer_without_token() {
        let service = builtin(ServiceKind::Esri).unwrap();
        assert!(create_renderer(&service, ClientOptions::default()).is_ok());
    }
}
