//! Rendering service configurations.
//!
//! Each backend is defined in a TOML file under `services/`, embedded at
//! compile time. A user file with the same shape may replace the embedded
//! one via [`load`].

use std::path::Path;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use uprn_maps_framing::Level;
use uprn_maps_models::{Elevation, MarkerStyle};

/// Environment variable overriding the Esri export endpoint.
pub const ESRI_EXPORT_URL_ENV: &str = "UPRN_MAPS_ESRI_EXPORT_URL";

/// Errors from loading a service configuration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The configuration file could not be read.
    #[error("Failed to read service config {path}: {source}")]
    Io {
        /// Path to the file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for a service.
    #[error("Failed to parse service config '{name}': {source}")]
    Toml {
        /// Service or file name.
        name: String,
        /// Parse error.
        source: toml::de::Error,
    },

    /// The configuration parsed but is unusable.
    #[error("Invalid service config '{name}': {reason}")]
    Invalid {
        /// Service id.
        name: String,
        /// What is wrong.
        reason: String,
    },

    /// A required access token is not set.
    #[error("Service '{service}' needs an access token in ${env}")]
    MissingToken {
        /// Service id.
        service: String,
        /// Environment variable that should hold the token.
        env: String,
    },
}

/// Supported rendering backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ServiceKind {
    /// ArcGIS Server `ExportWebMap`.
    Esri,
    /// Mapbox Static Images API.
    Mapbox,
}

/// A rendering service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Unique identifier (`"esri"` or `"mapbox"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
    /// Output page layout.
    pub page: PageConfig,
    /// Group ladder, tightest first. The last level is the topmost.
    pub levels: Vec<LevelConfig>,
    /// Level used for the run-level overview page.
    pub overview: LevelConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// ArcGIS Server print service.
    Esri {
        /// `Export Web Map Task/execute` endpoint.
        export_url: String,
        /// Basemap map service drawn under the markers.
        basemap_url: String,
        /// Raster format requested from the service (e.g. `"JPG"`).
        format: String,
        /// Layout template name (e.g. `"MAP_ONLY"`).
        layout_template: String,
        /// Label text size in points.
        #[serde(default = "default_label_font_size")]
        label_font_size: f64,
    },
    /// Mapbox Static Images API.
    Mapbox {
        /// API base URL (e.g. `"https://api.mapbox.com"`).
        base_url: String,
        /// Style id (e.g. `"mapbox/streets-v12"`).
        style: String,
        /// Environment variable holding the access token.
        #[serde(default = "default_token_env")]
        token_env: String,
        /// Largest image side the API accepts.
        #[serde(default = "default_max_dimension")]
        max_dimension: u32,
    },
}

const fn default_label_font_size() -> f64 {
    8.0
}

fn default_token_env() -> String {
    "MAPBOX_ACCESS_TOKEN".to_owned()
}

const fn default_max_dimension() -> u32 {
    1280
}

/// Page size and title placement, in pixels at `dpi`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageConfig {
    /// Page width in pixels.
    pub width: u32,
    /// Page height in pixels.
    pub height: u32,
    /// Page resolution.
    pub dpi: u32,
    /// Title placement.
    pub title: TitleConfig,
}

/// Title baseline position (from the top-left corner) and size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TitleConfig {
    /// Left edge in pixels.
    pub x: u32,
    /// Baseline in pixels from the top.
    pub y: u32,
    /// Font size in points.
    pub size: f64,
}

/// One ladder level plus its marker style and page slot.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LevelConfig {
    /// Scale denominator.
    pub elevation: u32,
    /// Requested image width in pixels.
    pub width: u32,
    /// Requested image height in pixels.
    pub height: u32,
    /// Requested image resolution.
    pub dpi: u32,
    /// Marker size in points.
    pub marker_size: f64,
    /// Marker outline width in points.
    pub outline_width: f64,
    /// Where the tile is placed on the page.
    pub slot: SlotConfig,
}

/// A rectangle on the page, in pixels from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SlotConfig {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl SlotConfig {
    fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        right.is_some_and(|r| r <= width) && bottom.is_some_and(|b| b <= height)
    }
}

impl LevelConfig {
    /// The framing level for this config.
    #[must_use]
    pub const fn level(&self) -> Level {
        Level {
            elevation: Elevation(self.elevation),
            width: self.width,
            height: self.height,
            dpi: self.dpi,
        }
    }

    /// Marker style for this level.
    #[must_use]
    pub const fn style(&self) -> MarkerStyle {
        MarkerStyle {
            size: self.marker_size,
            outline_width: self.outline_width,
        }
    }
}

impl ServiceConfig {
    /// Framing ladder for group pages.
    #[must_use]
    pub fn ladder(&self) -> Vec<Level> {
        self.levels.iter().map(LevelConfig::level).collect()
    }

    /// Looks up the group ladder level at `elevation`.
    #[must_use]
    pub fn level_at(&self, elevation: Elevation) -> Option<&LevelConfig> {
        self.levels
            .iter()
            .find(|l| Elevation(l.elevation) == elevation)
    }

    /// Resolves the access token this service needs, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingToken`] if the provider needs a token
    /// and its environment variable is unset or empty.
    pub fn access_token(&self) -> Result<Option<String>, RegistryError> {
        match &self.provider {
            ProviderConfig::Esri { .. } => Ok(None),
            ProviderConfig::Mapbox { token_env, .. } => std::env::var(token_env)
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(Some)
                .ok_or_else(|| RegistryError::MissingToken {
                    service: self.id.clone(),
                    env: token_env.clone(),
                }),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let ProviderConfig::Esri { export_url, .. } = &mut self.provider
            && let Ok(url) = std::env::var(ESRI_EXPORT_URL_ENV)
            && !url.trim().is_empty()
        {
            log::info!("Using Esri export URL from ${ESRI_EXPORT_URL_ENV}");
            *export_url = url.trim().to_owned();
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::Invalid {
            name: self.id.clone(),
            reason,
        };

        if self.levels.is_empty() {
            return Err(invalid("at least one level is required".to_owned()));
        }
        if self.page.width == 0 || self.page.height == 0 || self.page.dpi == 0 {
            return Err(invalid("page width, height and dpi must be non-zero".to_owned()));
        }

        for level in self.levels.iter().chain(std::iter::once(&self.overview)) {
            if level.elevation == 0 || level.width == 0 || level.height == 0 || level.dpi == 0 {
                return Err(invalid(format!(
                    "level 1:{} has a zero scale, size or dpi",
                    level.elevation
                )));
            }
            let slot = level.slot;
            if !slot.fits_within(self.page.width, self.page.height) {
                return Err(invalid(format!(
                    "slot for level 1:{} lies outside the page",
                    level.elevation
                )));
            }
        }

        for pair in self.levels.windows(2) {
            if pair[0].elevation >= pair[1].elevation {
                return Err(invalid(
                    "levels must be ordered tightest (smallest scale) first".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const ESRI_TOML: &str = include_str!("../services/esri.toml");
const MAPBOX_TOML: &str = include_str!("../services/mapbox.toml");

fn parse(name: &str, toml_str: &str) -> Result<ServiceConfig, RegistryError> {
    let mut config: ServiceConfig =
        toml::de::from_str(toml_str).map_err(|e| RegistryError::Toml {
            name: name.to_owned(),
            source: e,
        })?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Returns the embedded configuration for `kind`.
///
/// # Errors
///
/// Returns [`RegistryError`] if the embedded TOML fails to parse or
/// validate.
pub fn builtin(kind: ServiceKind) -> Result<ServiceConfig, RegistryError> {
    match kind {
        ServiceKind::Esri => parse("esri", ESRI_TOML),
        ServiceKind::Mapbox => parse("mapbox", MAPBOX_TOML),
    }
}

/// Loads a configuration from a user TOML file.
///
/// # Errors
///
/// Returns [`RegistryError`] if the file cannot be read, parsed, or
/// validated.
pub fn load(path: &Path) -> Result<ServiceConfig, RegistryError> {
    let contents = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = parse(&path.display().to_string(), &contents)?;
    log::info!("Loaded service config '{}' from {}", config.id, path.display());
    Ok(config)
}
