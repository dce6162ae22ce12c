#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Orchestrates a map run.
//!
//! [`run`] groups the locations, frames and builds requests for every
//! group plus the run-level overview, and renders groups concurrently.
//! Each page is composed as soon as its group's tiles arrive, so tiles
//! never outlive their page.
//!
//! A group whose render fails is logged and left out; the run only fails
//! if no group renders at all. Requests within a group are rendered
//! sequentially, so no more than `concurrency` requests are in flight.

pub mod cancel;

use std::fmt::Write as _;
use std::sync::Arc;

use futures::stream::{self, StreamExt as _};
use uprn_maps_compose::{
    ComposeError, DocumentWriter, Page, PageKind, PageTemplate, Slot, TitlePlacement,
    compose_page, finalize,
};
use uprn_maps_framing::{FramingError, frame, frame_level};
use uprn_maps_grouping::{Clusterer, GroupingError, Strategy, group_with};
use uprn_maps_models::progress::ProgressCallback;
use uprn_maps_models::{Elevation, GroupKey, LocationRecord, MapRequest, RenderedTile};
use uprn_maps_render::{MapRenderer, RenderFailure};
use uprn_maps_request::service_registry::{LevelConfig, ServiceConfig};
use uprn_maps_request::{BuildOptions, ColorScheme, LabelVerbosity, build, overview};

pub use cancel::{CancelHandle, Cancellation, cancellation};

/// Default number of groups rendered at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// There was nothing to map.
    #[error("No locations to map")]
    NoLocations,

    /// Grouping produced no group that gets a page.
    #[error("Grouping produced no mappable groups")]
    NoGroups,

    /// Every group failed to render.
    #[error("None of the {failed} group(s) could be rendered")]
    NoRenderableGroups {
        /// Number of groups that failed.
        failed: usize,
    },

    /// The run was cancelled before composition.
    #[error("Run cancelled")]
    Cancelled,

    /// Grouping failed.
    #[error(transparent)]
    Grouping(#[from] GroupingError),

    /// Framing failed.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// Composition or writing failed.
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Everything a run needs besides its collaborators.
pub struct RunRequest {
    /// Locations to map.
    pub locations: Vec<LocationRecord>,
    /// Grouping strategy.
    pub strategy: Strategy,
    /// Density clustering backend for [`Strategy::Cluster`].
    pub clusterer: Arc<dyn Clusterer>,
    /// Rendering service layout and ladder.
    pub service: ServiceConfig,
    /// Marker label text.
    pub labels: LabelVerbosity,
    /// Maximum groups rendered at once.
    pub concurrency: usize,
    /// Document title.
    pub title: String,
    /// Whether to add the run-level overview page.
    pub include_overview: bool,
    /// Progress reporting, one step per group (plus the overview).
    pub progress: Arc<dyn ProgressCallback>,
}

/// A group that has no page in the document.
#[derive(Debug)]
pub struct FailedGroup {
    /// Group key (`None` for the run-level overview).
    pub key: Option<GroupKey>,
    /// Why it failed.
    pub failure: RenderFailure,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunReport {
    /// Page-producing groups.
    pub groups: usize,
    /// Locations grouped as density noise.
    pub noise: usize,
    /// Map requests issued.
    pub requests: usize,
    /// Pages in the document.
    pub pages: usize,
    /// Whether the overview page is present.
    pub overview_rendered: bool,
    /// Groups left out of the document.
    pub failed: Vec<FailedGroup>,
}

struct Job {
    key: Option<GroupKey>,
    title: String,
    requests: Vec<MapRequest>,
}

struct JobResult {
    key: Option<GroupKey>,
    title: String,
    outcome: Result<Vec<RenderedTile>, RenderFailure>,
}

#[derive(Default)]
struct Composed {
    pages: Vec<Page>,
    failed: Vec<FailedGroup>,
    overview_rendered: bool,
}

/// Runs the pipeline end to end.
///
/// # Errors
///
/// Returns [`PipelineError`] if there is nothing to map, the strategy is
/// invalid, no group renders, the run is cancelled, or the document cannot
/// be composed or written.
pub async fn run(
    request: RunRequest,
    renderer: &dyn MapRenderer,
    writer: &dyn DocumentWriter,
    cancel: Cancellation,
) -> Result<RunReport, PipelineError> {
    let RunRequest {
        locations,
        strategy,
        clusterer,
        service,
        labels,
        concurrency,
        title,
        include_overview,
        progress,
    } = request;

    if locations.is_empty() {
        return Err(PipelineError::NoLocations);
    }

    let grouping = group_with(&locations, &strategy, clusterer.as_ref())?;
    let noise = grouping.get(&GroupKey::Noise).map_or(0, |g| g.len());
    let page_groups: Vec<_> = grouping.values().filter(|g| g.key().has_page()).collect();
    if page_groups.is_empty() {
        return Err(PipelineError::NoGroups);
    }

    let Some(context) = grouping
        .values()
        .map(|g| *g.bounds())
        .reduce(|a, b| a.union(&b))
    else {
        return Err(PipelineError::NoGroups);
    };

    let mapped: usize = grouping.values().map(|g| g.len()).sum();
    let colors = ColorScheme::for_grouping(&grouping);
    let options = BuildOptions::from_service(&service, labels);
    let ladder = service.ladder();

    let mut jobs = Vec::with_capacity(page_groups.len() + 1);
    if include_overview {
        let framing = frame_level(service.overview.level(), true, &context.wgs84);
        jobs.push(Job {
            key: None,
            title: overview_title(&title, mapped, page_groups.len()),
            requests: vec![overview(&grouping, &framing, &colors, &options)],
        });
    }
    for group in &page_groups {
        let framings = frame(group.members(), &ladder, &context)?;
        jobs.push(Job {
            key: Some(group.key().clone()),
            title: group.title(),
            requests: build(group, &framings, &colors, &options),
        });
    }

    let requests: usize = jobs.iter().map(|j| j.requests.len()).sum();
    log::info!(
        "Rendering {} group(s), {requests} map request(s) (concurrency={})",
        page_groups.len(),
        concurrency.max(1)
    );

    progress.set_total(jobs.len() as u64);
    progress.set_message("Rendering maps".to_owned());

    let group_template = group_template(&service);
    let overview_template = overview_template(&service);

    let mut rendering = std::pin::pin!(
        stream::iter(jobs.into_iter().map(|job| {
            let progress = progress.clone();
            async move {
                let result = render_job(renderer, job).await;
                progress.inc(1);
                result
            }
        }))
        .buffer_unordered(concurrency.max(1))
    );

    let composing = async {
        let mut composed = Composed::default();
        while let Some(result) = rendering.next().await {
            let JobResult {
                key,
                title,
                outcome,
            } = result;
            match outcome {
                Ok(tiles) => {
                    let page = match key {
                        Some(key) => {
                            compose_page(PageKind::Group(key), &title, tiles, &group_template)?
                        }
                        None => {
                            composed.overview_rendered = true;
                            compose_page(PageKind::Overview, &title, tiles, &overview_template)?
                        }
                    };
                    composed.pages.push(page);
                }
                Err(failure) => {
                    log::error!("{failure}");
                    composed.failed.push(FailedGroup { key, failure });
                }
            }
        }
        Ok::<_, ComposeError>(composed)
    };

    let Composed {
        pages,
        mut failed,
        overview_rendered,
    } = tokio::select! {
        () = cancel.clone().cancelled() => {
            progress.finish_and_clear();
            log::warn!("Run cancelled, abandoning in-flight renders");
            return Err(PipelineError::Cancelled);
        }
        composed = composing => composed?,
    };

    if cancel.is_cancelled() {
        progress.finish_and_clear();
        return Err(PipelineError::Cancelled);
    }

    failed.sort_by(|a, b| a.key.cmp(&b.key));

    let group_failures = failed.iter().filter(|f| f.key.is_some()).count();
    if group_failures == page_groups.len() {
        progress.finish_and_clear();
        return Err(PipelineError::NoRenderableGroups {
            failed: group_failures,
        });
    }

    if !failed.is_empty() {
        log::warn!("{}", missing_pages_summary(&failed));
    }

    let document = finalize(&title, pages);
    let page_count = document.pages.len();
    writer.write(document)?;

    progress.finish(format!("{page_count} page(s) written"));

    Ok(RunReport {
        groups: page_groups.len(),
        noise,
        requests,
        pages: page_count,
        overview_rendered,
        failed,
    })
}

async fn render_job(renderer: &dyn MapRenderer, job: Job) -> JobResult {
    let Job {
        key,
        title,
        requests,
    } = job;

    let mut tiles = Vec::with_capacity(requests.len());
    for request in requests {
        match renderer.render(request).await {
            Ok(tile) => tiles.push(tile),
            Err(failure) => {
                return JobResult {
                    key,
                    title,
                    outcome: Err(failure),
                };
            }
        }
    }

    JobResult {
        key,
        title,
        outcome: Ok(tiles),
    }
}

fn overview_title(title: &str, properties: usize, groups: usize) -> String {
    format!("{title}: {properties} properties in {groups} group(s)")
}

fn missing_pages_summary(failed: &[FailedGroup]) -> String {
    let mut summary = format!("{} page(s) missing from the document:", failed.len());
    for f in failed {
        let name = f
            .key
            .as_ref()
            .map_or_else(|| "overview".to_owned(), ToString::to_string);
        let _ = write!(summary, "\n  - {name}: {}", f.failure.error);
    }
    summary
}

fn slot(level: &LevelConfig) -> Slot {
    Slot {
        elevation: Elevation(level.elevation),
        x: level.slot.x,
        y: level.slot.y,
        width: level.slot.width,
        height: level.slot.height,
    }
}

fn template(service: &ServiceConfig, slots: Vec<Slot>) -> PageTemplate {
    PageTemplate {
        width: service.page.width,
        height: service.page.height,
        dpi: service.page.dpi,
        title: TitlePlacement {
            x: service.page.title.x,
            y: service.page.title.y,
            size: service.page.title.size,
        },
        slots,
    }
}

/// Page template for group pages: one slot per ladder level.
#[must_use]
pub fn group_template(service: &ServiceConfig) -> PageTemplate {
    template(service, service.levels.iter().map(slot).collect())
}

/// Page template for the run-level overview page.
#[must_use]
pub fn overview_template(service: &ServiceConfig) -> PageTemplate {
    template(service, vec![slot(&service.overview)])
}
