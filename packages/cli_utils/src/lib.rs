#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `uprn_maps` binary.
//!
//! Log records and the page progress bar share one terminal. Call
//! [`init_logger`] first and add every bar to the [`MultiProgress`] it
//! returns; log lines are then printed above the bars instead of through
//! them.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use uprn_maps_models::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Filter applied when `RUST_LOG` is unset or empty.
pub const DEFAULT_LOG_FILTER: &str = "info";

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const PAGES_TEMPLATE: &str =
    "  {msg} {wide_bar:.cyan/dim} {pos}/{len} pages [{elapsed_precise}, eta {eta}]";

/// Page counter for a map run.
///
/// Spins while locations are grouped and framed, then switches to a
/// counted bar when the run announces how many pages it will render.
pub struct PageProgress {
    bar: ProgressBar,
    counted: ProgressStyle,
}

impl PageProgress {
    #[must_use]
    pub fn maps_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_owned());
        bar.enable_steady_tick(Duration::from_millis(120));

        let counted = ProgressStyle::with_template(PAGES_TEMPLATE)
            .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("=>-"));

        Arc::new(Self { bar, counted })
    }
}

impl ProgressCallback for PageProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counted.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Picks the log filter: `RUST_LOG` when it holds something, else
/// [`DEFAULT_LOG_FILTER`].
fn log_filter(env: Option<String>) -> String {
    env.filter(|filter| !filter.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned())
}

/// Installs `pretty_env_logger` behind an `indicatif-log-bridge` wrapper.
///
/// A second call keeps the logger already installed.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let filter = log_filter(std::env::var("RUST_LOG").ok());
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filter)
        .build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_counts_pages_once_total_is_known() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = PageProgress::maps_bar(&multi, "Grouping locations");
        progress.set_total(3);
        progress.inc(2);
        progress.set_message("Rendering maps".to_owned());
        progress.finish("3 page(s) written".to_owned());
    }

    #[test]
    fn empty_rust_log_falls_back_to_info() {
        assert_eq!(log_filter(None), "info");
        assert_eq!(log_filter(Some("  ".to_owned())), "info");
        assert_eq!(log_filter(Some("uprn_maps_render=debug".to_owned())), "uprn_maps_render=debug");
    }
}
