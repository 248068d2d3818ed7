//! Global gradient solver for a single hydraulic snapshot.
//!
//! Junction heads are the unknowns of a symmetric positive definite system
//! assembled from the linearized link laws; link flows are then corrected
//! from the new heads. Iteration stops when the relative flow change drops
//! below the accuracy option and no link changes status.
//!
//! The head matrix is sparse with one off-diagonal pair per link between two
//! junctions. Its pattern is fixed for the life of the solver, so the
//! symbolic Cholesky factorization is built once and every later trial and
//! snapshot only refactors the numeric values.

use nalgebra::DMatrix;
use nalgebra_sparse::factorization::{CscCholesky, CscSymbolicCholesky};
use nalgebra_sparse::pattern::SparsityPattern;
use tracing::debug;

use super::error::{clock_time, HydraulicsError, HydraulicsResult};
use super::headloss::{emitter_loss, pressure_demand_loss, LinkLoss, LinkModel};
use super::network::{
    DemandModel, DemandModelKind, LinkKind, LinkStatus, Network, NodeKind, Unbalanced,
};

/// Head tolerance for status checks, m.
const HEAD_TOLERANCE: f64 = 1.5e-4;
/// Flow tolerance for status checks, m3/s.
const FLOW_TOLERANCE: f64 = 2.8e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    Open,
    /// Closed by the input file or a zero pump speed.
    Closed,
    /// Closed by the solver: a check valve against reverse flow, or a pump
    /// that cannot deliver the head rise across it.
    Blocked,
}

/// Per-step boundary conditions.
pub struct SnapshotInput<'a> {
    pub time: u64,
    /// Required demand per node, m3/s; only junction entries are used.
    pub demands: &'a [f64],
    /// Known head per node; `Some` exactly for reservoirs and tanks.
    pub fixed_heads: &'a [Option<f64>],
    /// Relative speed per link; only pump entries are used.
    pub speeds: &'a [f64],
}

/// Flow state carried from one snapshot to the next as a warm start.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub flows: Vec<f64>,
    pub status: Vec<FlowStatus>,
    pub emitter_flows: Vec<f64>,
    pub demand_flows: Vec<f64>,
}

impl FlowState {
    pub fn new(network: &Network) -> Self {
        let flows = network
            .links
            .iter()
            .map(|link| match &link.kind {
                LinkKind::Pipe { diameter, .. } | LinkKind::Valve { diameter, .. } => {
                    // one foot per second
                    0.3048 * std::f64::consts::PI * diameter * diameter / 4.0
                }
                LinkKind::Pump { curve, .. } => curve.design_flow(),
            })
            .collect();
        let status = network
            .links
            .iter()
            .map(|link| {
                let stopped = matches!(link.kind, LinkKind::Pump { speed, .. } if speed == 0.0);
                if link.status == LinkStatus::Closed || stopped {
                    FlowStatus::Closed
                } else {
                    FlowStatus::Open
                }
            })
            .collect();

        Self {
            flows,
            status,
            emitter_flows: vec![0.0; network.nodes.len()],
            demand_flows: vec![0.0; network.nodes.len()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub heads: Vec<f64>,
    pub trials: usize,
    pub balanced: bool,
}

/// Pressure driven demand parameters converted to metres of head.
#[derive(Debug, Clone, Copy)]
struct PressureDemand {
    minimum_head: f64,
    range: f64,
    exponent: f64,
}

pub struct HydraulicSolver<'a> {
    network: &'a Network,
    models: Vec<LinkModel>,
    rows: Vec<Option<usize>>,
    system: HeadSystem,
    pressure_demand: Option<PressureDemand>,
}

/// Linearization of one link or pseudo-link: `p = 1 / gradient`,
/// `y = headloss / gradient`.
#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    p: f64,
    y: f64,
}

impl From<LinkLoss> for Coefficients {
    fn from(loss: LinkLoss) -> Self {
        let p = 1.0 / loss.gradient;
        Self {
            p,
            y: loss.headloss * p,
        }
    }
}

impl<'a> HydraulicSolver<'a> {
    pub fn new(network: &'a Network, demand_model: &DemandModel) -> HydraulicsResult<Self> {
        let models = network
            .links
            .iter()
            .map(|link| LinkModel::new(link, &network.options))
            .collect();

        let mut unknowns = 0;
        let rows: Vec<Option<usize>> = network
            .nodes
            .iter()
            .map(|node| {
                node.is_junction().then(|| {
                    unknowns += 1;
                    unknowns - 1
                })
            })
            .collect();

        let pressure = network.options.flow_units.pressure();
        let pressure_demand = (demand_model.kind == DemandModelKind::Pda).then(|| PressureDemand {
            minimum_head: demand_model.minimum_pressure * pressure,
            range: (demand_model.required_pressure - demand_model.minimum_pressure) * pressure,
            exponent: demand_model.pressure_exponent,
        });

        let system = HeadSystem::new(network, &rows, unknowns)?;
        debug!(unknowns, entries = system.pattern.nnz(), "head matrix indexed");

        Ok(Self {
            network,
            models,
            rows,
            system,
            pressure_demand,
        })
    }

    fn trial_limit(&self) -> usize {
        match self.network.options.unbalanced {
            Unbalanced::Stop => self.network.options.trials,
            Unbalanced::Continue(extra) => self.network.options.trials + extra,
        }
    }

    pub fn solve(
        &mut self,
        input: &SnapshotInput<'_>,
        state: &mut FlowState,
    ) -> HydraulicsResult<SnapshotOutcome> {
        let nodes = &self.network.nodes;
        let mut heads: Vec<f64> = nodes
            .iter()
            .zip(input.fixed_heads)
            .map(|(node, fixed)| fixed.unwrap_or(node.elevation))
            .collect();

        if self.pressure_demand.is_some() {
            for (index, demand) in input.demands.iter().enumerate() {
                if state.demand_flows[index] <= 0.0 || state.demand_flows[index] > *demand {
                    state.demand_flows[index] = demand.max(0.0);
                }
            }
        }

        // start emitters at their discharge under one metre of head
        for (index, node) in nodes.iter().enumerate() {
            if node.emitter > 0.0 && state.emitter_flows[index] == 0.0 {
                state.emitter_flows[index] = node.emitter;
            }
        }

        let limit = self.trial_limit();
        let mut link_terms = vec![Coefficients::default(); self.network.links.len()];
        let mut emitter_terms = vec![Coefficients::default(); nodes.len()];
        let mut demand_terms = vec![Coefficients::default(); nodes.len()];

        for trial in 1..=limit {
            let mut values = vec![0.0; self.system.pattern.nnz()];
            let mut rhs = vec![0.0; self.system.diagonal.len()];
            let diagonal = &self.system.diagonal;

            for (index, link) in self.network.links.iter().enumerate() {
                let flow = state.flows[index];
                let loss = match state.status[index] {
                    FlowStatus::Open => self.models[index].evaluate(flow, input.speeds[index]),
                    FlowStatus::Closed | FlowStatus::Blocked => LinkLoss::closed(flow),
                };
                let terms = Coefficients::from(loss);
                link_terms[index] = terms;

                let (from, to) = (link.from, link.to);
                let carried = flow - terms.y;
                match (self.rows[from], self.rows[to]) {
                    (Some(r), Some(c)) => {
                        values[diagonal[r]] += terms.p;
                        values[diagonal[c]] += terms.p;
                        if let Some(slots) = self.system.off_diagonal[index] {
                            for slot in slots {
                                values[slot] -= terms.p;
                            }
                        }
                        rhs[r] -= carried;
                        rhs[c] += carried;
                    }
                    (Some(r), None) => {
                        values[diagonal[r]] += terms.p;
                        rhs[r] += terms.p * heads[to] - carried;
                    }
                    (None, Some(c)) => {
                        values[diagonal[c]] += terms.p;
                        rhs[c] += terms.p * heads[from] + carried;
                    }
                    (None, None) => {}
                }
            }

            for (index, node) in nodes.iter().enumerate() {
                let Some(row) = self.rows[index] else {
                    continue;
                };
                let demand = input.demands[index];
                match self.pressure_demand {
                    Some(pda) if demand > 0.0 => {
                        let flow = state.demand_flows[index];
                        let terms = Coefficients::from(pressure_demand_loss(
                            flow,
                            demand,
                            pda.range,
                            pda.exponent,
                        ));
                        demand_terms[index] = terms;
                        values[diagonal[row]] += terms.p;
                        rhs[row] += terms.p * (node.elevation + pda.minimum_head) - (flow - terms.y);
                    }
                    _ => rhs[row] -= demand,
                }

                if node.emitter > 0.0 {
                    let flow = state.emitter_flows[index];
                    let terms = Coefficients::from(emitter_loss(
                        flow,
                        node.emitter,
                        self.network.options.emitter_exponent,
                    ));
                    emitter_terms[index] = terms;
                    values[diagonal[row]] += terms.p;
                    rhs[row] += terms.p * node.elevation - (flow - terms.y);
                }
            }

            let solution = self.system.solve(&values, &rhs).ok_or_else(|| {
                HydraulicsError::IllConditioned {
                    time: clock_time(input.time),
                    what: "head equations are not positive definite".to_string(),
                }
            })?;
            for (index, row) in self.rows.iter().enumerate() {
                if let Some(row) = row {
                    heads[index] = solution[*row];
                }
            }

            let mut change = 0.0;
            let mut total = 0.0;
            for (index, link) in self.network.links.iter().enumerate() {
                let terms = link_terms[index];
                let delta = terms.p * (heads[link.from] - heads[link.to]) - terms.y;
                state.flows[index] += delta;
                change += delta.abs();
                total += state.flows[index].abs();
            }
            for (index, node) in nodes.iter().enumerate() {
                if self.rows[index].is_none() {
                    continue;
                }
                if node.emitter > 0.0 {
                    let terms = emitter_terms[index];
                    let delta = terms.p * (heads[index] - node.elevation) - terms.y;
                    state.emitter_flows[index] += delta;
                    change += delta.abs();
                    total += state.emitter_flows[index].abs();
                }
                if let Some(pda) = self.pressure_demand {
                    if input.demands[index] > 0.0 {
                        let terms = demand_terms[index];
                        let ground = node.elevation + pda.minimum_head;
                        let delta = terms.p * (heads[index] - ground) - terms.y;
                        state.demand_flows[index] += delta;
                        change += delta.abs();
                        total += state.demand_flows[index].abs();
                    }
                }
            }

            let relative = if total > 0.0 { change / total } else { change };
            if !relative.is_finite() {
                return Err(HydraulicsError::IllConditioned {
                    time: clock_time(input.time),
                    what: "flows diverged".to_string(),
                });
            }

            if relative <= self.network.options.accuracy {
                let changed = self.update_status(&heads, input.speeds, state);
                if changed == 0 {
                    debug!(time = input.time, trials = trial, "hydraulics balanced");
                    return Ok(SnapshotOutcome {
                        heads,
                        trials: trial,
                        balanced: true,
                    });
                }
                debug!(time = input.time, changed, "link status changed");
            }
        }

        match self.network.options.unbalanced {
            Unbalanced::Stop => Err(HydraulicsError::Unbalanced {
                time: clock_time(input.time),
                trials: limit,
            }),
            Unbalanced::Continue(_) => Ok(SnapshotOutcome {
                heads,
                trials: limit,
                balanced: false,
            }),
        }
    }

    /// Opens or blocks check valves and pumps; returns how many changed.
    fn update_status(&self, heads: &[f64], speeds: &[f64], state: &mut FlowState) -> usize {
        let mut changed = 0;
        for (index, link) in self.network.links.iter().enumerate() {
            let current = state.status[index];
            if current == FlowStatus::Closed {
                continue;
            }
            let drop = heads[link.from] - heads[link.to];
            let flow = state.flows[index];

            let next = match &link.kind {
                LinkKind::Pipe {
                    check_valve: true, ..
                } => match current {
                    FlowStatus::Open if flow < -FLOW_TOLERANCE => FlowStatus::Blocked,
                    FlowStatus::Blocked if drop > HEAD_TOLERANCE => FlowStatus::Open,
                    other => other,
                },
                LinkKind::Pump { curve, .. } => {
                    let shutoff = curve.shutoff_head(speeds[index]);
                    let rise = -drop;
                    match current {
                        FlowStatus::Open if rise > shutoff + HEAD_TOLERANCE => FlowStatus::Blocked,
                        FlowStatus::Open if flow < -FLOW_TOLERANCE => FlowStatus::Blocked,
                        FlowStatus::Blocked if rise < shutoff - HEAD_TOLERANCE => FlowStatus::Open,
                        other => other,
                    }
                }
                _ => current,
            };

            if next != current {
                state.status[index] = next;
                changed += 1;
            }
        }
        changed
    }

    /// Net flow out of each fixed-grade node into the network.
    pub fn fixed_grade_outflows(&self, state: &FlowState) -> Vec<f64> {
        let mut outflows = vec![0.0; self.network.nodes.len()];
        for (index, link) in self.network.links.iter().enumerate() {
            let flow = state.flows[index];
            outflows[link.from] += flow;
            outflows[link.to] -= flow;
        }
        for (index, node) in self.network.nodes.iter().enumerate() {
            if matches!(node.kind, NodeKind::Junction { .. }) {
                outflows[index] = 0.0;
            }
        }
        outflows
    }

    /// Demand actually delivered at each junction, emitter discharge included.
    pub fn delivered_demands(&self, input: &SnapshotInput<'_>, state: &FlowState) -> Vec<f64> {
        self.network
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                if !node.is_junction() {
                    return 0.0;
                }
                let demand = input.demands[index];
                let consumed = if self.pressure_demand.is_some() && demand > 0.0 {
                    state.demand_flows[index]
                } else {
                    demand
                };
                consumed + state.emitter_flows[index]
            })
            .collect()
    }
}

/// Junction head equations in compressed sparse column form.
struct HeadSystem {
    pattern: SparsityPattern,
    /// Value slot of the diagonal entry of each row.
    diagonal: Vec<usize>,
    /// Value slots of the `(from, to)` and `(to, from)` entries of each link
    /// joining two junctions.
    off_diagonal: Vec<Option<[usize; 2]>>,
    factor: Option<CscCholesky<f64>>,
}

impl HeadSystem {
    fn new(network: &Network, rows: &[Option<usize>], unknowns: usize) -> HydraulicsResult<Self> {
        // per column: (row, owning link and side); `None` is the diagonal
        let mut columns: Vec<Vec<(usize, Option<(usize, usize)>)>> =
            (0..unknowns).map(|column| vec![(column, None)]).collect();
        for (index, link) in network.links.iter().enumerate() {
            if let (Some(r), Some(c)) = (rows[link.from], rows[link.to]) {
                columns[c].push((r, Some((index, 0))));
                columns[r].push((c, Some((index, 1))));
            }
        }

        let mut offsets = Vec::with_capacity(unknowns + 1);
        let mut indices = Vec::new();
        let mut diagonal = vec![0; unknowns];
        let mut off_diagonal = vec![None; network.links.len()];
        for (column, mut entries) in columns.into_iter().enumerate() {
            let start = indices.len();
            offsets.push(start);
            entries.sort_unstable_by_key(|(row, _)| *row);
            for (row, owner) in entries {
                // parallel links share one entry
                if indices.len() == start || indices.last() != Some(&row) {
                    indices.push(row);
                }
                let slot = indices.len() - 1;
                match owner {
                    None => diagonal[column] = slot,
                    Some((link, side)) => {
                        off_diagonal[link].get_or_insert([0; 2])[side] = slot;
                    }
                }
            }
        }
        offsets.push(indices.len());

        let pattern =
            SparsityPattern::try_from_offsets_and_indices(unknowns, unknowns, offsets, indices)
                .map_err(|err| {
                    HydraulicsError::network(format!("cannot index head equations: {err}"))
                })?;

        Ok(Self {
            pattern,
            diagonal,
            off_diagonal,
            factor: None,
        })
    }

    /// Factors `values` (laid out on `pattern`) and solves for `rhs`. The
    /// symbolic analysis is kept after the first success.
    fn solve(&mut self, values: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
        if rhs.is_empty() {
            return Some(Vec::new());
        }

        let factor = match self.factor.take() {
            Some(mut factor) => {
                factor.refactor(values).ok()?;
                factor
            }
            None => {
                let symbolic = CscSymbolicCholesky::factor(self.pattern.clone());
                CscCholesky::factor_numerical(symbolic, values).ok()?
            }
        };
        let factor = self.factor.insert(factor);

        let solution = factor.solve(&DMatrix::from_column_slice(rhs.len(), 1, rhs));
        solution
            .iter()
            .all(|value| value.is_finite())
            .then(|| solution.as_slice().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydraulics::parser::parse_inp;

    struct Steady {
        network: Network,
        outcome: SnapshotOutcome,
        state: FlowState,
    }

    impl Steady {
        fn node(&self, id: &str) -> usize {
            self.network.node_index(id).expect("known node")
        }

        fn link(&self, id: &str) -> usize {
            self.network.link_index(id).expect("known link")
        }

        fn head(&self, id: &str) -> f64 {
            self.outcome.heads[self.node(id)]
        }

        fn flow(&self, id: &str) -> f64 {
            self.state.flows[self.link(id)]
        }
    }

    fn solve_steady(text: &str) -> Steady {
        let network = parse_inp(text).expect("valid network");
        network.validate().expect("solvable network");
        let demands: Vec<f64> = network
            .nodes
            .iter()
            .map(|node| match &node.kind {
                NodeKind::Junction { demands } => demands.iter().map(|demand| demand.base).sum(),
                _ => 0.0,
            })
            .collect();
        let fixed_heads: Vec<Option<f64>> = network
            .nodes
            .iter()
            .map(|node| match &node.kind {
                NodeKind::Reservoir { head, .. } => Some(*head),
                NodeKind::Tank(tank) => Some(node.elevation + tank.initial_level),
                NodeKind::Junction { .. } => None,
            })
            .collect();
        let speeds = vec![1.0; network.links.len()];
        let input = SnapshotInput {
            time: 0,
            demands: &demands,
            fixed_heads: &fixed_heads,
            speeds: &speeds,
        };

        let mut state = FlowState::new(&network);
        let outcome = HydraulicSolver::new(&network, &network.options.demand_model)
            .expect("indexed network")
            .solve(&input, &mut state)
            .expect("balanced");
        Steady {
            network,
            outcome,
            state,
        }
    }

    #[test]
    fn single_pipe_matches_hazen_williams() {
        let steady = solve_steady(
            "[OPTIONS]\nUNITS LPS\n[RESERVOIRS]\nR1 100\n[JUNCTIONS]\nJ1 0 50\n[PIPES]\nP1 R1 J1 1000 300 100\n",
        );

        assert!(steady.outcome.balanced);
        assert!((steady.flow("P1") - 0.05).abs() < 1e-9);
        let expected_loss = 10.667 * 1_000.0 * 0.05_f64.powf(1.852)
            / (100.0_f64.powf(1.852) * 0.3_f64.powf(4.871));
        assert!((steady.head("J1") - (100.0 - expected_loss)).abs() < 1e-3);
    }

    #[test]
    fn parallel_pipes_split_flow_evenly() {
        let steady = solve_steady(
            "\
[OPTIONS]
UNITS LPS
[RESERVOIRS]
R1 80
[JUNCTIONS]
J1 0 40
[PIPES]
P1 R1 J1 500 250 110
P2 R1 J1 500 250 110
",
        );

        assert!(steady.outcome.balanced);
        assert!((steady.flow("P1") - steady.flow("P2")).abs() < 1e-6);
        assert!((steady.flow("P1") + steady.flow("P2") - 0.04).abs() < 1e-9);
    }

    #[test]
    fn check_valve_blocks_reverse_flow() {
        let steady = solve_steady(
            "\
[OPTIONS]
UNITS LPS
[RESERVOIRS]
HIGH 100
LOW  50
[JUNCTIONS]
J1 0 10
[PIPES]
P1 HIGH J1 1000 300 100
P2 LOW  J1 1000 300 100 0 CV
",
        );

        assert!(steady.outcome.balanced);
        assert_eq!(steady.state.status[steady.link("P2")], FlowStatus::Blocked);
        assert!(steady.flow("P2").abs() < 1e-5);
        assert!((steady.flow("P1") - 0.01).abs() < 1e-5);
    }

    #[test]
    fn check_valve_passes_forward_flow() {
        let steady = solve_steady(
            "\
[OPTIONS]
UNITS LPS
[RESERVOIRS]
HIGH 100
LOW  50
[JUNCTIONS]
J1 0 10
[PIPES]
P1 HIGH J1 1000 300 100
P2 J1 LOW 1000 300 100 0 CV
",
        );

        assert_eq!(steady.state.status[steady.link("P2")], FlowStatus::Open);
        assert!(steady.flow("P2") > 0.0);
        assert!((steady.flow("P1") - steady.flow("P2") - 0.01).abs() < 1e-9);
    }

    #[test]
    fn pump_lifts_water_to_higher_reservoir() {
        let steady = solve_steady(
            "\
[OPTIONS]
UNITS LPS
[RESERVOIRS]
SUMP 0
UPPER 20
[JUNCTIONS]
J1 0 0
[PUMPS]
PU1 SUMP J1 HEAD C1
[PIPES]
P1 J1 UPPER 100 300 130
[CURVES]
C1 50 30
",
        );

        assert!(steady.outcome.balanced);
        assert_eq!(steady.state.status[steady.link("PU1")], FlowStatus::Open);
        assert!(steady.flow("PU1") > 0.0);
        assert!((steady.flow("PU1") - steady.flow("P1")).abs() < 1e-9);
        assert!(steady.head("J1") > 20.0);
    }

    #[test]
    fn emitter_discharges_with_pressure() {
        let steady = solve_steady(
            "\
[OPTIONS]
UNITS LPS
[RESERVOIRS]
R1 50
[JUNCTIONS]
J1 0 0
[PIPES]
P1 R1 J1 10 500 140
[EMITTERS]
J1 1
",
        );

        assert!(steady.outcome.balanced);
        let junction = steady.node("J1");
        let expected = 0.001 * steady.head("J1").sqrt();
        assert!((steady.state.emitter_flows[junction] - expected).abs() < 1e-5);
        assert!((steady.flow("P1") - steady.state.emitter_flows[junction]).abs() < 1e-9);
    }

    #[test]
    fn pressure_driven_demand_is_reduced_at_low_pressure() {
        let steady = solve_steady(
            "\
[OPTIONS]
UNITS LPS
DEMAND MODEL PDA
MINIMUM PRESSURE 0
REQUIRED PRESSURE 30
PRESSURE EXPONENT 0.5
[RESERVOIRS]
R1 10
[JUNCTIONS]
J1 0 5
[PIPES]
P1 R1 J1 10 500 140
",
        );

        assert!(steady.outcome.balanced);
        let delivered = steady.state.demand_flows[steady.node("J1")];
        assert!(delivered > 0.0 && delivered < 0.005);
        let expected = 0.005 * (steady.head("J1") / 30.0).sqrt();
        assert!((delivered - expected).abs() < 1e-5);
    }

    #[test]
    fn unbalanced_stop_reports_error() {
        let network = parse_inp(
            "[OPTIONS]\nUNITS LPS\nTRIALS 1\nACCURACY 0.0000001\n[RESERVOIRS]\nR1 100\n[JUNCTIONS]\nJ1 0 50\n[PIPES]\nP1 R1 J1 1000 300 100\n",
        )
        .expect("valid network");
        let mut solver =
            HydraulicSolver::new(&network, &network.options.demand_model).expect("indexed network");
        let mut state = FlowState::new(&network);
        // junctions are indexed before reservoirs
        let input = SnapshotInput {
            time: 3_600,
            demands: &[0.05, 0.0],
            fixed_heads: &[None, Some(100.0)],
            speeds: &[1.0],
        };

        let error = solver
            .solve(&input, &mut state)
            .expect_err("one trial is not enough");
        assert_eq!(
            error.to_string(),
            "system unbalanced at 1:00:00: no convergence after 1 trials"
        );
    }

    #[test]
    fn unbalanced_continue_returns_last_iterate() {
        let network = parse_inp(
            "[OPTIONS]\nUNITS LPS\nTRIALS 1\nACCURACY 0.0000001\nUNBALANCED CONTINUE\n[RESERVOIRS]\nR1 100\n[JUNCTIONS]\nJ1 0 50\n[PIPES]\nP1 R1 J1 1000 300 100\n",
        )
        .expect("valid network");
        let mut solver =
            HydraulicSolver::new(&network, &network.options.demand_model).expect("indexed network");
        let mut state = FlowState::new(&network);
        let input = SnapshotInput {
            time: 0,
            demands: &[0.05, 0.0],
            fixed_heads: &[None, Some(100.0)],
            speeds: &[1.0],
        };

        let outcome = solver.solve(&input, &mut state).expect("continues");
        assert!(!outcome.balanced);
        assert_eq!(outcome.trials, 1);
    }

    fn chain_network(junctions: usize) -> String {
        let mut text = String::from("[OPTIONS]\nUNITS LPS\n[RESERVOIRS]\nR0 500\n[JUNCTIONS]\n");
        for index in 1..=junctions {
            text.push_str(&format!("J{index} 0 0.1\n"));
        }
        text.push_str("[PIPES]\n");
        for index in 1..=junctions {
            let upstream = if index == 1 {
                "R0".to_string()
            } else {
                format!("J{}", index - 1)
            };
            text.push_str(&format!("P{index} {upstream} J{index} 10 300 130\n"));
        }
        text
    }

    #[test]
    fn long_chain_stores_only_neighbour_entries() {
        let junctions = 2_000;
        let steady = solve_steady(&chain_network(junctions));

        assert!(steady.outcome.balanced);
        assert!((steady.flow("P1") - 0.2).abs() < 1e-7);
        assert!((steady.flow(&format!("P{junctions}")) - 0.0001).abs() < 1e-9);
        let heads: Vec<f64> = (1..=junctions)
            .map(|index| steady.head(&format!("J{index}")))
            .collect();
        assert!(heads.windows(2).all(|pair| pair[0] > pair[1]));

        let solver = HydraulicSolver::new(&steady.network, &steady.network.options.demand_model)
            .expect("indexed network");
        assert_eq!(solver.system.pattern.nnz(), 3 * junctions - 2);
    }

    #[test]
    fn parallel_junction_links_share_matrix_entries() {
        let network = parse_inp(
            "[RESERVOIRS]\nR1 100\n[JUNCTIONS]\nJ1 0 1\nJ2 0 1\n[PIPES]\nP1 R1 J1 100 12 100\nP2 J1 J2 100 8 100\nP3 J2 J1 100 8 100\n",
        )
        .expect("valid network");
        let solver =
            HydraulicSolver::new(&network, &network.options.demand_model).expect("indexed network");

        assert_eq!(solver.system.pattern.nnz(), 4);
        let p2 = solver.system.off_diagonal[network.link_index("P2").expect("P2")];
        let p3 = solver.system.off_diagonal[network.link_index("P3").expect("P3")];
        let (Some(p2), Some(p3)) = (p2, p3) else {
            panic!("junction links need off-diagonal slots");
        };
        assert_eq!(p2[0], p3[1]);
        assert_eq!(p2[1], p3[0]);
        assert!(solver.system.off_diagonal[network.link_index("P1").expect("P1")].is_none());
    }

    #[test]
    fn factorization_is_reused_between_snapshots() {
        let network = parse_inp(
            "[OPTIONS]\nUNITS LPS\n[RESERVOIRS]\nR1 100\n[JUNCTIONS]\nJ1 0 10\nJ2 0 10\n[PIPES]\nP1 R1 J1 1000 300 100\nP2 J1 J2 1000 300 100\n",
        )
        .expect("valid network");
        let mut solver =
            HydraulicSolver::new(&network, &network.options.demand_model).expect("indexed network");
        let mut state = FlowState::new(&network);
        let j2 = network.node_index("J2").expect("J2");
        let mut fixed_heads = vec![None; network.nodes.len()];
        fixed_heads[network.node_index("R1").expect("R1")] = Some(100.0);
        let speeds = [1.0, 1.0];

        let mut last_heads = Vec::new();
        for demand in [0.01, 0.02] {
            let mut demands = vec![0.0; network.nodes.len()];
            demands[j2] = demand;
            let input = SnapshotInput {
                time: 0,
                demands: &demands,
                fixed_heads: &fixed_heads,
                speeds: &speeds,
            };
            let outcome = solver.solve(&input, &mut state).expect("balanced");
            assert!(solver.system.factor.is_some());
            assert!((state.flows[network.link_index("P2").expect("P2")] - demand).abs() < 1e-9);
            last_heads.push(outcome.heads[j2]);
        }
        assert!(last_heads[1] < last_heads[0]);
    }
}
