use std::path::Path;
use std::time::Duration;

use crate::hydraulics::{DemandModel, HydraulicsError, Project};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Keep solver warnings out of the log.
    pub quiet: bool,
}

/// Outcome of a completed hydraulic run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesRun {
    pub snapshots: usize,
    pub unbalanced_steps: usize,
}

/// Loads network models into sessions that can be simulated.
pub trait HydraulicEngine: Send + Sync {
    fn open(
        &self,
        path: &Path,
        options: OpenOptions,
    ) -> Result<Box<dyn NetworkSession>, HydraulicsError>;
}

/// One loaded network. Sessions are used from a single blocking thread.
pub trait NetworkSession: Send {
    fn set_demand_model(&mut self, model: DemandModel) -> Result<(), HydraulicsError>;
    fn compute_hydraulic_time_series(&mut self) -> Result<TimeSeriesRun, HydraulicsError>;
    fn junction_count(&self) -> usize;
    fn link_count(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl HydraulicEngine for NativeEngine {
    fn open(
        &self,
        path: &Path,
        options: OpenOptions,
    ) -> Result<Box<dyn NetworkSession>, HydraulicsError> {
        let mut project = Project::open(path)?;
        project.set_quiet(options.quiet);
        Ok(Box::new(NativeSession { project }))
    }
}

struct NativeSession {
    project: Project,
}

impl NetworkSession for NativeSession {
    fn set_demand_model(&mut self, model: DemandModel) -> Result<(), HydraulicsError> {
        self.project.set_demand_model(model)
    }

    fn compute_hydraulic_time_series(&mut self) -> Result<TimeSeriesRun, HydraulicsError> {
        let series = self.project.compute_hydraulic_time_series()?;
        Ok(TimeSeriesRun {
            snapshots: series.len(),
            unbalanced_steps: series
                .snapshots
                .iter()
                .filter(|snapshot| !snapshot.balanced)
                .count(),
        })
    }

    fn junction_count(&self) -> usize {
        self.project.junction_count()
    }

    fn link_count(&self) -> usize {
        self.project.link_count()
    }
}

/// Formats elapsed wall time the way simulation reports print it.
pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:.3}", elapsed.as_secs_f64())
}
