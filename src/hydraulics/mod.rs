//! Native EPANET-compatible hydraulic engine.
//!
//! A [`Project`] owns a network read from an `.inp` file together with the
//! demand model used to solve it, and runs extended period simulations with
//! the global gradient algorithm.

pub mod error;
pub mod headloss;
pub mod network;
pub mod parser;
pub mod simulation;
pub mod solver;
pub mod units;

use std::path::Path;

use tracing::debug;

pub use error::{HydraulicsError, HydraulicsResult};
pub use network::{DemandModel, DemandModelKind, Network};
pub use simulation::{HydraulicSnapshot, HydraulicTimeSeries};

#[derive(Debug, Clone)]
pub struct Project {
    network: Network,
    demand_model: DemandModel,
    quiet: bool,
}

impl Project {
    pub fn open(path: &Path) -> HydraulicsResult<Self> {
        let network = parser::read_inp(path)?;
        debug!(
            path = %path.display(),
            nodes = network.nodes.len(),
            links = network.links.len(),
            "network loaded"
        );
        Ok(Self::from_network(network))
    }

    pub fn from_inp_str(text: &str) -> HydraulicsResult<Self> {
        parser::parse_inp(text).map(Self::from_network)
    }

    fn from_network(network: Network) -> Self {
        let demand_model = network.options.demand_model;
        Self {
            network,
            demand_model,
            quiet: false,
        }
    }

    /// Suppresses solver warnings in the log.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn set_demand_model(&mut self, model: DemandModel) -> HydraulicsResult<()> {
        model.validate()?;
        self.demand_model = model;
        Ok(())
    }

    pub fn demand_model(&self) -> &DemandModel {
        &self.demand_model
    }

    pub fn compute_hydraulic_time_series(&self) -> HydraulicsResult<HydraulicTimeSeries> {
        self.network.validate()?;
        simulation::run(&self.network, &self.demand_model, self.quiet)
    }

    pub fn junction_count(&self) -> usize {
        self.network.junction_count()
    }

    pub fn link_count(&self) -> usize {
        self.network.link_count()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}
