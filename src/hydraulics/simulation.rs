//! Extended period simulation: a sequence of snapshots joined by tank level
//! updates and pattern changes.

use tracing::{debug, warn};

use super::error::{clock_time, HydraulicsResult};
use super::network::{DemandModel, LinkKind, LinkStatus, Network, NodeKind};
use super::solver::{FlowState, FlowStatus, HydraulicSolver, SnapshotInput};

/// Pressures below this many metres are reported as negative.
const NEGATIVE_PRESSURE: f64 = -1e-3;

/// Network state at one reporting time. Values are in SI units.
#[derive(Debug, Clone)]
pub struct HydraulicSnapshot {
    pub time: u64,
    pub heads: Vec<f64>,
    pub pressures: Vec<f64>,
    pub demands: Vec<f64>,
    pub flows: Vec<f64>,
    pub trials: usize,
    pub balanced: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HydraulicTimeSeries {
    pub snapshots: Vec<HydraulicSnapshot>,
}

impl HydraulicTimeSeries {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn last(&self) -> Option<&HydraulicSnapshot> {
        self.snapshots.last()
    }
}

pub(crate) fn run(
    network: &Network,
    demand_model: &DemandModel,
    quiet: bool,
) -> HydraulicsResult<HydraulicTimeSeries> {
    let mut solver = HydraulicSolver::new(network, demand_model)?;
    let mut state = FlowState::new(network);
    let mut levels: Vec<Option<f64>> = network
        .nodes
        .iter()
        .map(|node| match &node.kind {
            NodeKind::Tank(tank) => Some(tank.initial_level),
            _ => None,
        })
        .collect();

    let times = network.times;
    let mut series = HydraulicTimeSeries::default();
    let mut time = 0;

    loop {
        let period = (time + times.pattern_start) / times.pattern_step;
        let demands = junction_demands(network, period);
        let fixed_heads = fixed_heads(network, &levels, period);
        let speeds = pump_speeds(network, period);
        apply_pump_speeds(network, &speeds, &mut state);

        let input = SnapshotInput {
            time,
            demands: &demands,
            fixed_heads: &fixed_heads,
            speeds: &speeds,
        };
        let outcome = solver.solve(&input, &mut state)?;
        if !outcome.balanced && !quiet {
            warn!(
                time = %clock_time(time),
                trials = outcome.trials,
                "hydraulics unbalanced, continuing with last iterate"
            );
        }

        let pressures: Vec<f64> = network
            .nodes
            .iter()
            .zip(&outcome.heads)
            .map(|(node, head)| head - node.elevation)
            .collect();
        if !quiet {
            let negative = network
                .nodes
                .iter()
                .zip(&pressures)
                .filter(|(node, pressure)| node.is_junction() && **pressure < NEGATIVE_PRESSURE)
                .count();
            if negative > 0 {
                warn!(time = %clock_time(time), junctions = negative, "negative pressures");
            }
        }

        series.snapshots.push(HydraulicSnapshot {
            time,
            pressures,
            demands: solver.delivered_demands(&input, &state),
            flows: state.flows.clone(),
            heads: outcome.heads,
            trials: outcome.trials,
            balanced: outcome.balanced,
        });

        if time >= times.duration {
            break;
        }

        let pattern_time = time + times.pattern_start;
        let to_pattern_change = times.pattern_step - pattern_time % times.pattern_step;
        let step = times
            .hydraulic_step
            .min(to_pattern_change)
            .min(times.duration - time);

        let outflows = solver.fixed_grade_outflows(&state);
        for (index, node) in network.nodes.iter().enumerate() {
            if let (NodeKind::Tank(tank), Some(level)) = (&node.kind, levels[index].as_mut()) {
                let next = *level - outflows[index] * step as f64 / tank.area();
                *level = next.clamp(tank.min_level, tank.max_level);
            }
        }

        time += step;
    }

    debug!(snapshots = series.len(), "extended period simulation finished");
    Ok(series)
}

fn multiplier(network: &Network, pattern: Option<usize>, period: u64) -> f64 {
    pattern
        .map(|index| network.patterns[index].multiplier(period))
        .unwrap_or(1.0)
}

fn junction_demands(network: &Network, period: u64) -> Vec<f64> {
    let scale = network.options.demand_multiplier;
    let default_pattern = network.options.default_pattern;
    network
        .nodes
        .iter()
        .map(|node| match &node.kind {
            NodeKind::Junction { demands } => demands
                .iter()
                .map(|demand| {
                    let pattern = demand.pattern.or(default_pattern);
                    demand.base * multiplier(network, pattern, period) * scale
                })
                .sum(),
            _ => 0.0,
        })
        .collect()
}

fn fixed_heads(network: &Network, levels: &[Option<f64>], period: u64) -> Vec<Option<f64>> {
    network
        .nodes
        .iter()
        .zip(levels)
        .map(|(node, level)| match &node.kind {
            NodeKind::Junction { .. } => None,
            NodeKind::Reservoir { head, pattern } => {
                Some(head * multiplier(network, *pattern, period))
            }
            NodeKind::Tank(tank) => Some(node.elevation + level.unwrap_or(tank.initial_level)),
        })
        .collect()
}

fn pump_speeds(network: &Network, period: u64) -> Vec<f64> {
    network
        .links
        .iter()
        .map(|link| match &link.kind {
            LinkKind::Pump { speed, pattern, .. } => speed * multiplier(network, *pattern, period),
            _ => 1.0,
        })
        .collect()
}

/// Stops pumps whose pattern drops to zero speed and restarts them after.
fn apply_pump_speeds(network: &Network, speeds: &[f64], state: &mut FlowState) {
    for (index, link) in network.links.iter().enumerate() {
        if !matches!(link.kind, LinkKind::Pump { .. }) || link.status == LinkStatus::Closed {
            continue;
        }
        let status = &mut state.status[index];
        if speeds[index] <= 0.0 {
            *status = FlowStatus::Closed;
        } else if *status == FlowStatus::Closed {
            *status = FlowStatus::Open;
        }
    }
}
