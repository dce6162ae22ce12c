//! ArcGIS Server `ExportWebMap` backend.
//!
//! The print task takes a web map JSON document describing the basemap,
//! the marker features and the output size, renders it, and answers with
//! the URL of the finished image. Both calls go through the retry loop.
//! The print task can also report a failure inside a 200 response; a 429
//! or 5xx code there is retried like the HTTP status would be.

use serde::{Deserialize, Serialize};
use uprn_maps_framing::bng;
use uprn_maps_models::{MapRequest, Marker, ProjectedCoord, RenderedTile};

use crate::retry::{RetryPolicy, classify, is_retryable_status};
use crate::{MapRenderer, RenderError, RenderFailure};

/// British National Grid.
pub const BNG_WKID: u32 = 27700;

const LABEL_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Renders through an ArcGIS Server print service.
pub struct EsriRenderer {
    pub(crate) client: reqwest::Client,
    pub(crate) retry: RetryPolicy,
    pub(crate) export_url: String,
    pub(crate) basemap_url: String,
    pub(crate) format: String,
    pub(crate) layout_template: String,
    pub(crate) label_font_size: f64,
}

#[async_trait::async_trait]
impl MapRenderer for EsriRenderer {
    async fn render(&self, request: MapRequest) -> Result<RenderedTile, RenderFailure> {
        log::debug!("Exporting {} via ExportWebMap", request.describe());
        match self.export(&request).await {
            Ok(bytes) => Ok(RenderedTile::for_request(&request, bytes)),
            Err(error) => Err(RenderFailure::new(&request, error)),
        }
    }
}

impl EsriRenderer {
    async fn export(&self, request: &MapRequest) -> Result<Vec<u8>, RenderError> {
        let web_map = WebMap::for_request(request, &self.basemap_url, self.label_font_size);
        let web_map_json =
            serde_json::to_string(&web_map).map_err(|e| RenderError::Decode(e.to_string()))?;

        let form = [
            ("Web_Map_as_JSON", web_map_json.as_str()),
            ("Format", self.format.as_str()),
            ("Layout_Template", self.layout_template.as_str()),
            ("f", "json"),
        ];

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        let url = loop {
            let response = self
                .retry
                .send(|| self.client.post(&self.export_url).form(&form))
                .await?;
            let text = response.text().await.map_err(classify)?;
            match image_url(&text) {
                Err(RenderError::Service { status, body })
                    if is_retryable_status(status) && attempt < max_attempts =>
                {
                    log::warn!("  export error {status} (attempt {attempt}/{max_attempts}): {body}");
                    self.retry.backoff(attempt, max_attempts).await;
                    attempt += 1;
                }
                result => break result?,
            }
        };

        log::debug!("Downloading {} from {url}", request.describe());
        let image = self.retry.send(|| self.client.get(&url)).await?;
        let bytes = image.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}

/// Extracts `results[0].value.url` from an export response.
fn image_url(body: &str) -> Result<String, RenderError> {
    let response: ExportResponse =
        serde_json::from_str(body).map_err(|e| RenderError::Decode(format!("{e}: {body}")))?;

    if let Some(error) = response.error {
        return Err(RenderError::Service {
            status: error.code,
            body: error.message,
        });
    }

    response
        .results
        .into_iter()
        .next()
        .and_then(|r| r.value.url)
        .ok_or_else(|| RenderError::Decode(format!("export response has no image URL: {body}")))
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    #[serde(default)]
    results: Vec<ExportResult>,
    error: Option<ExportError>,
}

#[derive(Debug, Deserialize)]
struct ExportResult {
    value: ExportValue,
}

#[derive(Debug, Deserialize)]
struct ExportValue {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportError {
    code: u16,
    #[serde(default)]
    message: String,
}

// ── Web map JSON ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebMap {
    map_options: MapOptions,
    operational_layers: Vec<OperationalLayer>,
    base_map: BaseMap,
    export_options: ExportOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MapOptions {
    extent: Extent,
    scale: u32,
    spatial_reference: SpatialReference,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Extent {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
    spatial_reference: SpatialReference,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SpatialReference {
    wkid: u32,
}

const BNG: SpatialReference = SpatialReference { wkid: BNG_WKID };

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BaseMap {
    title: String,
    base_map_layers: Vec<BaseMapLayer>,
}

#[derive(Debug, Serialize)]
struct BaseMapLayer {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationalLayer {
    id: String,
    title: String,
    opacity: f64,
    feature_collection: FeatureCollection,
}

#[derive(Debug, Serialize)]
struct FeatureCollection {
    layers: Vec<FeatureLayer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeatureLayer {
    layer_definition: LayerDefinition,
    feature_set: FeatureSet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LayerDefinition {
    name: String,
    geometry_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeatureSet {
    geometry_type: &'static str,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct Feature {
    geometry: Point,
    symbol: Symbol,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Point {
    x: f64,
    y: f64,
    spatial_reference: SpatialReference,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum Symbol {
    #[serde(rename = "esriSMS")]
    Marker {
        style: &'static str,
        color: [u8; 4],
        size: f64,
        outline: Outline,
    },
    #[serde(rename = "esriTS")]
    Text {
        text: String,
        color: [u8; 4],
        #[serde(rename = "horizontalAlignment")]
        horizontal_alignment: &'static str,
        #[serde(rename = "verticalAlignment")]
        vertical_alignment: &'static str,
        xoffset: f64,
        yoffset: f64,
        font: Font,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "esriSLS")]
struct Outline {
    style: &'static str,
    color: [u8; 4],
    width: f64,
}

#[derive(Debug, Serialize)]
struct Font {
    family: &'static str,
    size: f64,
    weight: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportOptions {
    output_size: [u32; 2],
    dpi: u32,
}

const POINT: &str = "esriGeometryPoint";

impl WebMap {
    fn for_request(request: &MapRequest, basemap_url: &str, label_font_size: f64) -> Self {
        let low = bng::from_wgs84(request.extent.min_y, request.extent.min_x);
        let high = bng::from_wgs84(request.extent.max_y, request.extent.max_x);

        let features = request
            .markers
            .iter()
            .flat_map(|marker| marker_features(marker, request, label_font_size))
            .collect();

        Self {
            map_options: MapOptions {
                extent: Extent {
                    xmin: low.x.min(high.x),
                    ymin: low.y.min(high.y),
                    xmax: low.x.max(high.x),
                    ymax: low.y.max(high.y),
                    spatial_reference: BNG,
                },
                scale: request.elevation.scale(),
                spatial_reference: BNG,
            },
            operational_layers: vec![OperationalLayer {
                id: "uprn-markers".to_owned(),
                title: "Properties".to_owned(),
                opacity: 1.0,
                feature_collection: FeatureCollection {
                    layers: vec![FeatureLayer {
                        layer_definition: LayerDefinition {
                            name: "markers".to_owned(),
                            geometry_type: POINT,
                        },
                        feature_set: FeatureSet {
                            geometry_type: POINT,
                            features,
                        },
                    }],
                },
            }],
            base_map: BaseMap {
                title: "Basemap".to_owned(),
                base_map_layers: vec![BaseMapLayer {
                    url: basemap_url.to_owned(),
                }],
            },
            export_options: ExportOptions {
                output_size: [request.width, request.height],
                dpi: request.dpi,
            },
        }
    }
}

/// Circle, optional glyph, and label features for one marker.
fn marker_features(marker: &Marker, request: &MapRequest, label_font_size: f64) -> Vec<Feature> {
    let position = projected(marker);
    let point = || Point {
        x: position.x,
        y: position.y,
        spatial_reference: BNG,
    };
    let size = request.style.size;

    let mut features = vec![Feature {
        geometry: point(),
        symbol: Symbol::Marker {
            style: "esriSMSCircle",
            color: marker.color.fill,
            size,
            outline: Outline {
                style: "esriSLSSolid",
                color: marker.color.outline,
                width: request.style.outline_width,
            },
        },
    }];

    if let Some(glyph) = marker.glyph {
        features.push(Feature {
            geometry: point(),
            symbol: text_symbol(glyph.to_string(), "center", 0.0, size * 0.6),
        });
    }

    if !marker.label.is_empty() && !request.overview {
        features.push(Feature {
            geometry: point(),
            symbol: text_symbol(marker.label.clone(), "left", size, label_font_size),
        });
    }

    features
}

fn text_symbol(text: String, alignment: &'static str, xoffset: f64, size: f64) -> Symbol {
    Symbol::Text {
        text,
        color: LABEL_COLOR,
        horizontal_alignment: alignment,
        vertical_alignment: "middle",
        xoffset,
        yoffset: 0.0,
        font: Font {
            family: "Arial",
            size,
            weight: "bold",
        },
    }
}

fn projected(marker: &Marker) -> ProjectedCoord {
    marker
        .projected
        .unwrap_or_else(|| bng::from_wgs84(marker.position.lat, marker.position.lng))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uprn_maps_models::{
        BoundingBox, Coord, Elevation, GroupKey, MarkerColor, MarkerStyle,
    };

    use super::*;
    use crate::stub::{Reply, StubServer};

    fn request(glyph: Option<char>) -> MapRequest {
        MapRequest {
            key: Some(GroupKey::Postcode("AB1".to_owned())),
            elevation: Elevation(1750),
            overview: false,
            center: Coord::new(52.33, -0.18),
            extent: BoundingBox::around(-0.18, 52.33, 0.001, 0.001),
            width: 800,
            height: 600,
            dpi: 300,
            style: MarkerStyle {
                size: 20.0,
                outline_width: 3.0,
            },
            markers: vec![Marker {
                uprn: 100_090_000_001,
                position: Coord::new(52.33, -0.18),
                projected: Some(ProjectedCoord::new(524_000.0, 271_000.0)),
                label: "100090000001".to_owned(),
                color_index: Some(0),
                color: MarkerColor {
                    fill: [200, 220, 240, 255],
                    outline: [155, 175, 195, 255],
                },
                glyph,
            }],
        }
    }

    fn renderer(export_url: String) -> EsriRenderer {
        EsriRenderer {
            client: reqwest::Client::new(),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            export_url,
            basemap_url: "https://example.invalid/basemap".to_owned(),
            format: "PNG32".to_owned(),
            layout_template: "MAP_ONLY".to_owned(),
            label_font_size: 8.0,
        }
    }

    #[test]
    fn web_map_uses_bng_and_request_size() {
        let json = serde_json::to_value(WebMap::for_request(&request(None), "https://b", 8.0)).unwrap();

        assert_eq!(json["mapOptions"]["scale"], 1750);
        assert_eq!(json["mapOptions"]["spatialReference"]["wkid"], BNG_WKID);
        assert_eq!(json["exportOptions"]["outputSize"], serde_json::json!([800, 600]));
        assert_eq!(json["exportOptions"]["dpi"], 300);
        assert_eq!(json["baseMap"]["baseMapLayers"][0]["url"], "https://b");

        let features = &json["operationalLayers"][0]["featureCollection"]["layers"][0]["featureSet"]
            ["features"];
        assert_eq!(features[0]["geometry"]["x"], 524_000.0);
        assert_eq!(features[0]["symbol"]["type"], "esriSMS");
        assert_eq!(features[0]["symbol"]["outline"]["type"], "esriSLS");
        assert_eq!(features[0]["symbol"]["color"], serde_json::json!([200, 220, 240, 255]));
        assert_eq!(features[1]["symbol"]["type"], "esriTS");
        assert_eq!(features[1]["symbol"]["text"], "100090000001");
    }

    #[test]
    fn glyph_adds_centred_text() {
        let json = serde_json::to_value(WebMap::for_request(&request(Some('c')), "https://b", 8.0)).unwrap();
        let features = &json["operationalLayers"][0]["featureCollection"]["layers"][0]["featureSet"]
            ["features"];
        assert_eq!(features.as_array().unwrap().len(), 3);
        assert_eq!(features[1]["symbol"]["text"], "c");
        assert_eq!(features[1]["symbol"]["horizontalAlignment"], "center");
    }

    #[test]
    fn reads_image_url_or_service_error() {
        let ok = r#"{"results":[{"paramName":"Output_File","value":{"url":"https://x/y.png"}}]}"#;
        assert_eq!(image_url(ok).unwrap(), "https://x/y.png");

        let failed = r#"{"error":{"code":400,"message":"Invalid JSON"}}"#;
        assert!(matches!(
            image_url(failed),
            Err(RenderError::Service { status: 400, .. })
        ));

        assert!(matches!(image_url("{}"), Err(RenderError::Decode(_))));
        assert!(matches!(image_url("<html>"), Err(RenderError::Decode(_))));
    }

    #[tokio::test]
    async fn exports_then_downloads_image() {
        let server = StubServer::start_with_base(|base| {
            move |seen: &crate::stub::Seen| {
                if seen.request_line.starts_with("POST /export") {
                    assert!(seen.body.contains("Web_Map_as_JSON="));
                    assert!(seen.body.contains("f=json"));
                    let body = format!(r#"{{"results":[{{"value":{{"url":"{base}/out/map.png"}}}}]}}"#);
                    Reply::ok("application/json", body.into_bytes())
                } else {
                    assert!(seen.request_line.starts_with("GET /out/map.png"));
                    Reply::ok("image/png", b"raster".to_vec())
                }
            }
        })
        .await;

        let tile = renderer(server.url("/export"))
            .render(request(None))
            .await
            .unwrap();

        assert_eq!(tile.bytes, b"raster");
        assert_eq!(tile.elevation, Elevation(1750));
        assert_eq!(tile.key, Some(GroupKey::Postcode("AB1".to_owned())));
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn server_error_in_export_body_is_retried() {
        let server = StubServer::start_with_base(|base| {
            move |seen: &crate::stub::Seen| match seen.index {
                0 => Reply::ok(
                    "application/json",
                    br#"{"error":{"code":500,"message":"Unable to complete operation"}}"#.to_vec(),
                ),
                1 => {
                    let body = format!(r#"{{"results":[{{"value":{{"url":"{base}/out/map.png"}}}}]}}"#);
                    Reply::ok("application/json", body.into_bytes())
                }
                _ => Reply::ok("image/png", b"raster".to_vec()),
            }
        })
        .await;

        let tile = renderer(server.url("/export"))
            .render(request(None))
            .await
            .unwrap();

        assert_eq!(tile.bytes, b"raster");
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn client_error_in_export_body_is_final() {
        let server = StubServer::start(|_| {
            Reply::ok(
                "application/json",
                br#"{"error":{"code":400,"message":"Invalid JSON"}}"#.to_vec(),
            )
        })
        .await;

        let failure = renderer(server.url("/export"))
            .render(request(None))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, RenderError::Service { status: 400, .. }));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn failure_carries_group_and_level() {
        let server = StubServer::start(|_| Reply::status(502, "bad gateway")).await;

        let failure = renderer(server.url("/export"))
            .render(request(None))
            .await
            .unwrap_err();

        assert_eq!(failure.key, Some(GroupKey::Postcode("AB1".to_owned())));
        assert_eq!(failure.level, Elevation(1750));
        assert!(matches!(failure.error, RenderError::Service { status: 502, .. }));
        assert_eq!(server.hits(), 3);
    }
}
