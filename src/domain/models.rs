//! Model file listing and simulation runs over the models directory.

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{format_seconds, HydraulicEngine, OpenOptions};
use crate::hydraulics::{DemandModel, DemandModelKind, HydraulicsError};

pub const MODEL_EXTENSION: &str = ".inp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Result of a handler: always a message, tagged with how it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerOutcome {
    pub status: OutcomeStatus,
    pub message: String,
}

impl HandlerOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub file_name: String,
    #[serde(skip)]
    pub elapsed: Duration,
    pub junctions: usize,
    pub links: usize,
}

/// Demand-driven analysis with the pressure parameters left at zero.
pub fn default_demand_model() -> DemandModel {
    DemandModel::new(DemandModelKind::Dda, 0.0, 0.0, 0.0)
}

pub async fn list_model_files(models_directory: &Path) -> HandlerOutcome {
    let is_directory = match tokio::fs::metadata(models_directory).await {
        Ok(metadata) => metadata.is_dir(),
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!(directory = %models_directory.display(), error = %err, "models directory unreadable");
            return HandlerOutcome::failure(format!("Error: {err}"));
        }
    };
    if !is_directory {
        return HandlerOutcome::failure(format!(
            "Error: The folder '{}' does not exist.",
            models_directory.display()
        ));
    }

    let files = match scan_model_files(models_directory).await {
        Ok(files) => files,
        Err(err) => {
            warn!(directory = %models_directory.display(), error = %err, "model scan failed");
            return HandlerOutcome::failure(format!("Error: {err}"));
        }
    };

    if files.is_empty() {
        return HandlerOutcome::success("No .inp files found in the 'models' folder.");
    }

    let mut message = String::from("List of .inp files in the 'models' folder:\n\n");
    for (position, file) in files.iter().enumerate() {
        message.push_str(&format!("{}. {file}\n", position + 1));
    }
    HandlerOutcome::success(message)
}

async fn scan_model_files(models_directory: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(models_directory).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(MODEL_EXTENSION) {
            continue;
        }
        // metadata follows symlinks; dangling links are skipped
        match tokio::fs::metadata(entry.path()).await {
            Ok(metadata) if metadata.is_file() => files.push(name),
            _ => {}
        }
    }

    files.sort();
    Ok(files)
}

/// Runs a full hydraulic simulation of `file_name`. Blocks until the engine
/// finishes, so async callers move it onto a blocking thread.
pub fn run_simulation(
    engine: &dyn HydraulicEngine,
    models_directory: &Path,
    file_name: &str,
) -> (HandlerOutcome, Option<SimulationSummary>) {
    let path = models_directory.join(file_name);
    if !path.exists() {
        return (
            HandlerOutcome::failure(format!(
                "Error: The file '{file_name}' does not exist in the 'models' folder."
            )),
            None,
        );
    }

    match simulate(engine, &path, file_name) {
        Ok(summary) => {
            info!(
                file_name,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                junctions = summary.junctions,
                links = summary.links,
                "simulation completed"
            );
            let message = format!(
                "Simulation of '{file_name}' completed successfully.\nSimulation time: {} seconds\nThe model has {} nodes and {} pipes.",
                format_seconds(summary.elapsed),
                summary.junctions,
                summary.links,
            );
            (HandlerOutcome::success(message), Some(summary))
        }
        Err(err) => {
            warn!(file_name, error = %err, "simulation failed");
            (
                HandlerOutcome::failure(format!("Error during simulation: {err}")),
                None,
            )
        }
    }
}

fn simulate(
    engine: &dyn HydraulicEngine,
    path: &Path,
    file_name: &str,
) -> Result<SimulationSummary, HydraulicsError> {
    let mut session = engine.open(path, OpenOptions { quiet: true })?;
    session.set_demand_model(default_demand_model())?;

    let started = Instant::now();
    session.compute_hydraulic_time_series()?;
    let elapsed = started.elapsed();

    Ok(SimulationSummary {
        file_name: file_name.to_string(),
        elapsed,
        junctions: session.junction_count(),
        links: session.link_count(),
    })
}
