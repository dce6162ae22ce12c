//! Mapbox Static Images backend.
//!
//! One GET per request:
//! `{base}/styles/v1/{style}/static/{pins}/{lng},{lat},{zoom}/{w}x{h}`.
//! Elevation (a scale denominator) is converted to a fractional web
//! mercator zoom for the request's latitude and DPI.

use uprn_maps_models::{MapRequest, RenderedTile};

use crate::retry::{RetryPolicy, classify};
use crate::{MapRenderer, RenderError, RenderFailure};

/// Equatorial circumference of the web mercator sphere in metres.
const EARTH_CIRCUMFERENCE: f64 = 40_075_016.686;

/// Tile size used by the Static Images API.
const TILE_SIZE: f64 = 512.0;

const METRES_PER_INCH: f64 = 0.0254;

/// Longest URL the API accepts.
const MAX_URL_LEN: usize = 8192;

/// Marker sizes at or above this draw large pins.
const LARGE_PIN_SIZE: f64 = 12.0;

/// Renders through the Mapbox Static Images API.
pub struct MapboxRenderer {
    pub(crate) client: reqwest::Client,
    pub(crate) retry: RetryPolicy,
    pub(crate) base_url: String,
    pub(crate) style: String,
    pub(crate) access_token: String,
    pub(crate) max_dimension: u32,
}

#[async_trait::async_trait]
impl MapRenderer for MapboxRenderer {
    async fn render(&self, request: MapRequest) -> Result<RenderedTile, RenderFailure> {
        let url = self.url(&request);
        log::debug!("Fetching {} from Mapbox", request.describe());

        let result = async {
            let response = self
                .retry
                .send(|| {
                    self.client
                        .get(&url)
                        .query(&[("access_token", self.access_token.as_str())])
                })
                .await?;
            let bytes = response.bytes().await.map_err(classify)?;
            Ok::<_, RenderError>(bytes.to_vec())
        }
        .await;

        match result {
            Ok(bytes) => Ok(RenderedTile::for_request(&request, bytes)),
            Err(error) => Err(RenderFailure::new(&request, error)),
        }
    }
}

impl MapboxRenderer {
    /// Static image URL for `request`, without the access token.
    #[must_use]
    pub fn url(&self, request: &MapRequest) -> String {
        let width = request.width.min(self.max_dimension);
        let height = request.height.min(self.max_dimension);
        if width != request.width || height != request.height {
            log::warn!(
                "{}: {}x{} exceeds the {}px limit, requesting {width}x{height}",
                request.describe(),
                request.width,
                request.height,
                self.max_dimension
            );
        }

        let zoom = zoom_for(request.elevation.scale(), request.dpi, request.center.lat);
        let position = format!(
            "{:.6},{:.6},{zoom:.2}/{width}x{height}",
            request.center.lng, request.center.lat
        );

        let pins = pins(request);
        let url = if pins.is_empty() {
            format!("{}/styles/v1/{}/static/{position}", self.base_url, self.style)
        } else {
            format!(
                "{}/styles/v1/{}/static/{pins}/{position}",
                self.base_url, self.style
            )
        };

        if url.len() > MAX_URL_LEN {
            log::warn!(
                "{}: static image URL is {} characters, the service may reject it",
                request.describe(),
                url.len()
            );
        }
        url
    }
}

/// Comma-separated pin overlays, e.g. `pin-s-c+aabbcc(-0.18,52.33)`.
fn pins(request: &MapRequest) -> String {
    let size = if request.style.size >= LARGE_PIN_SIZE {
        "pin-l"
    } else {
        "pin-s"
    };

    request
        .markers
        .iter()
        .map(|marker| {
            let label = marker
                .glyph
                .filter(char::is_ascii_alphanumeric)
                .map(|g| format!("-{}", g.to_ascii_lowercase()))
                .unwrap_or_default();
            format!(
                "{size}{label}+{}({:.6},{:.6})",
                marker.color.fill_hex(),
                marker.position.lng,
                marker.position.lat
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Fractional zoom at which one pixel covers the ground distance of one
/// pixel at `scale` and `dpi`, clamped to the API's range.
#[must_use]
pub fn zoom_for(scale: u32, dpi: u32, lat: f64) -> f64 {
    let metres_per_pixel = f64::from(scale) * METRES_PER_INCH / f64::from(dpi.max(1));
    let zoom = (EARTH_CIRCUMFERENCE * lat.to_radians().cos() / (TILE_SIZE * metres_per_pixel)).log2();
    zoom.clamp(0.0, 22.0)
}
