//! `dialoguer` prompts for arguments missing from the command line.

use std::path::PathBuf;

use dialoguer::{Input, MultiSelect, Select};
use uprn_maps_models::RoundCategory;
use uprn_maps_request::ServiceKind;
use uprn_maps_source::validate_uprn;

use crate::StrategyKind;

/// Top-level modes offered when no subcommand is given.
pub enum Mode {
    Single,
    Batch,
}

impl Mode {
    const ALL: &[Self] = &[Self::Single, Self::Batch];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Single => "Map a single property",
            Self::Batch => "Map a batch of properties",
        }
    }
}

pub fn mode() -> Result<&'static Mode, dialoguer::Error> {
    let labels: Vec<&str> = Mode::ALL.iter().map(Mode::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(&Mode::ALL[idx])
}

pub fn input_path() -> Result<PathBuf, dialoguer::Error> {
    let path: String = Input::new()
        .with_prompt("Location CSV file")
        .interact_text()?;
    Ok(PathBuf::from(path.trim()))
}

pub fn uprn() -> Result<String, dialoguer::Error> {
    Input::new()
        .with_prompt("UPRN (12 digits)")
        .validate_with(|input: &String| validate_uprn(input).map(|_| ()).map_err(|e| e.to_string()))
        .interact_text()
}

pub fn service() -> Result<ServiceKind, dialoguer::Error> {
    const KINDS: &[(ServiceKind, &str)] = &[
        (ServiceKind::Esri, "Esri ArcGIS print service"),
        (ServiceKind::Mapbox, "Mapbox Static Images (needs MAPBOX_ACCESS_TOKEN)"),
    ];

    let labels: Vec<&str> = KINDS.iter().map(|(_, l)| *l).collect();
    let idx = Select::new()
        .with_prompt("Rendering service")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(KINDS[idx].0)
}

pub fn strategy() -> Result<StrategyKind, dialoguer::Error> {
    const KINDS: &[(StrategyKind, &str)] = &[
        (StrategyKind::Postcode, "One page per postcode"),
        (StrategyKind::Cluster, "One page per density cluster"),
        (StrategyKind::RoundDiff, "One page per changed round category"),
    ];

    let labels: Vec<&str> = KINDS.iter().map(|(_, l)| *l).collect();
    let idx = Select::new()
        .with_prompt("Grouping strategy")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(KINDS[idx].0)
}

pub fn eps(default: f64) -> Result<f64, dialoguer::Error> {
    let eps_str: String = Input::new()
        .with_prompt("Cluster radius (metres)")
        .default(default.to_string())
        .interact_text()?;
    Ok(eps_str.trim().parse().unwrap_or(default))
}

pub fn min_samples(default: usize) -> Result<usize, dialoguer::Error> {
    let samples_str: String = Input::new()
        .with_prompt("Minimum properties per cluster")
        .default(default.to_string())
        .interact_text()?;
    Ok(samples_str.trim().parse().unwrap_or(default))
}

pub fn categories() -> Result<Vec<RoundCategory>, dialoguer::Error> {
    let all = RoundCategory::all();
    let labels: Vec<String> = all
        .iter()
        .map(|c| format!("{c}: {}", c.label()))
        .collect();

    let selected = MultiSelect::new()
        .with_prompt("Round categories (space=toggle, a=all, enter=confirm)")
        .items(&labels)
        .defaults(&vec![true; all.len()])
        .interact()?;

    Ok(selected.into_iter().map(|i| all[i]).collect())
}
