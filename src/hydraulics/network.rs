//! In-memory water distribution network.
//!
//! All quantities are stored in SI: metres, cubic metres per second and
//! kilowatts. Conversion from the file's units happens in the parser.

use std::collections::{HashMap, VecDeque};

use super::error::{HydraulicsError, HydraulicsResult};
use super::units::FlowUnits;

#[derive(Debug, Clone, PartialEq)]
pub struct Demand {
    pub base: f64,
    pub pattern: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tank {
    pub initial_level: f64,
    pub min_level: f64,
    pub max_level: f64,
    pub diameter: f64,
}

impl Tank {
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.diameter * self.diameter / 4.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Junction { demands: Vec<Demand> },
    Reservoir { head: f64, pattern: Option<usize> },
    Tank(Tank),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub elevation: f64,
    /// Emitter discharge coefficient in m3/s per m^exponent; zero when absent.
    pub emitter: f64,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_junction(&self) -> bool {
        matches!(self.kind, NodeKind::Junction { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveType {
    Prv,
    Psv,
    Pbv,
    Fcv,
    Tcv,
    Gpv,
}

impl ValveType {
    pub fn parse(value: &str) -> Option<Self> {
        let valve = match value.to_ascii_uppercase().as_str() {
            "PRV" => Self::Prv,
            "PSV" => Self::Psv,
            "PBV" => Self::Pbv,
            "FCV" => Self::Fcv,
            "TCV" => Self::Tcv,
            "GPV" => Self::Gpv,
            _ => return None,
        };
        Some(valve)
    }
}

/// Head-gain characteristic of a pump at nominal speed.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpCurve {
    /// Constant power in kilowatts.
    Power { kilowatts: f64 },
    /// `h = shutoff - coefficient * q^exponent`.
    Function {
        shutoff: f64,
        coefficient: f64,
        exponent: f64,
    },
    /// Piecewise linear head against flow, flows strictly increasing.
    Table { points: Vec<(f64, f64)> },
}

impl PumpCurve {
    /// Fits a pump curve from `(flow, head)` points already in SI.
    pub fn fit(points: &[(f64, f64)]) -> Result<Self, String> {
        match points {
            [] => Err("pump curve has no points".to_string()),
            [(flow, head)] => {
                if *flow <= 0.0 || *head <= 0.0 {
                    return Err("single-point pump curve needs positive flow and head".to_string());
                }
                let shutoff = 4.0 / 3.0 * head;
                Ok(Self::Function {
                    shutoff,
                    coefficient: (shutoff - head) / (flow * flow),
                    exponent: 2.0,
                })
            }
            [(q0, h0), (q1, h1), (q2, h2)] if *q0 == 0.0 => {
                let valid = h0 > h1 && h1 > h2 && *q1 > 0.0 && q2 > q1;
                if !valid {
                    return Err("three-point pump curve must fall with increasing flow".to_string());
                }
                let exponent = ((h0 - h2) / (h0 - h1)).ln() / (q2 / q1).ln();
                if !(exponent > 0.0 && exponent < 20.0) {
                    return Err("three-point pump curve exponent out of range".to_string());
                }
                Ok(Self::Function {
                    shutoff: *h0,
                    coefficient: (h0 - h1) / q1.powf(exponent),
                    exponent,
                })
            }
            _ => {
                let increasing = points.windows(2).all(|pair| pair[1].0 > pair[0].0);
                let falling = points.windows(2).all(|pair| pair[1].1 < pair[0].1);
                if !increasing || !falling {
                    return Err(
                        "multi-point pump curve needs increasing flows and falling heads"
                            .to_string(),
                    );
                }
                Ok(Self::Table {
                    points: points.to_vec(),
                })
            }
        }
    }

    /// A reasonable starting flow for the solver.
    pub fn design_flow(&self) -> f64 {
        match self {
            Self::Power { .. } => 0.03,
            Self::Function {
                shutoff,
                coefficient,
                exponent,
            } => {
                if *coefficient > 0.0 {
                    (0.5 * shutoff / coefficient).powf(1.0 / exponent)
                } else {
                    0.03
                }
            }
            Self::Table { points } => {
                let first = points[0].0;
                let last = points[points.len() - 1].0;
                0.5 * (first + last)
            }
        }
    }

    /// Head at zero flow, scaled by relative speed.
    pub fn shutoff_head(&self, speed: f64) -> f64 {
        match self {
            Self::Power { .. } => f64::INFINITY,
            Self::Function { shutoff, .. } => speed * speed * shutoff,
            Self::Table { points } => speed * speed * points[0].1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkKind {
    Pipe {
        length: f64,
        diameter: f64,
        roughness: f64,
        minor_loss: f64,
        check_valve: bool,
    },
    Pump {
        curve: PumpCurve,
        speed: f64,
        pattern: Option<usize>,
    },
    Valve {
        valve_type: ValveType,
        diameter: f64,
        setting: f64,
        minor_loss: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub status: LinkStatus,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: String,
    pub multipliers: Vec<f64>,
}

impl Pattern {
    pub fn multiplier(&self, period: u64) -> f64 {
        if self.multipliers.is_empty() {
            return 1.0;
        }
        let index = (period % self.multipliers.len() as u64) as usize;
        self.multipliers[index]
    }
}

/// Raw curve points in the file's units.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub id: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadlossFormula {
    #[default]
    HazenWilliams,
    DarcyWeisbach,
    ChezyManning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unbalanced {
    #[default]
    Stop,
    /// Continue after the given number of extra trials.
    Continue(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemandModelKind {
    #[default]
    Dda,
    Pda,
}

impl DemandModelKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DDA" => Some(Self::Dda),
            "PDA" => Some(Self::Pda),
            _ => None,
        }
    }
}

/// Demand model and its pressure parameters, pressures in the file's units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandModel {
    pub kind: DemandModelKind,
    pub minimum_pressure: f64,
    pub required_pressure: f64,
    pub pressure_exponent: f64,
}

impl Default for DemandModel {
    fn default() -> Self {
        Self {
            kind: DemandModelKind::Dda,
            minimum_pressure: 0.0,
            required_pressure: 0.1,
            pressure_exponent: 0.5,
        }
    }
}

impl DemandModel {
    pub const MIN_PRESSURE_DIFFERENCE: f64 = 0.1;

    pub fn new(
        kind: DemandModelKind,
        minimum_pressure: f64,
        required_pressure: f64,
        pressure_exponent: f64,
    ) -> Self {
        Self {
            kind,
            minimum_pressure,
            required_pressure,
            pressure_exponent,
        }
    }

    /// Pressure parameters only constrain pressure driven analysis; demand
    /// driven analysis carries them through untouched.
    pub fn validate(&self) -> HydraulicsResult<()> {
        if self.kind == DemandModelKind::Dda {
            return Ok(());
        }
        if self.pressure_exponent <= 0.0 {
            return Err(HydraulicsError::InvalidDemandModel {
                what: "pressure exponent must be positive".to_string(),
            });
        }
        if self.minimum_pressure < 0.0 {
            return Err(HydraulicsError::InvalidDemandModel {
                what: "minimum pressure must not be negative".to_string(),
            });
        }
        if self.required_pressure - self.minimum_pressure < Self::MIN_PRESSURE_DIFFERENCE {
            return Err(HydraulicsError::InvalidDemandModel {
                what: "required pressure must exceed minimum pressure by at least 0.1"
                    .to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HydraulicOptions {
    pub flow_units: FlowUnits,
    pub headloss: HeadlossFormula,
    /// Kinematic viscosity in m2/s.
    pub viscosity: f64,
    pub trials: usize,
    pub accuracy: f64,
    pub unbalanced: Unbalanced,
    pub default_pattern: Option<usize>,
    pub demand_multiplier: f64,
    pub emitter_exponent: f64,
    pub demand_model: DemandModel,
}

impl Default for HydraulicOptions {
    fn default() -> Self {
        Self {
            flow_units: FlowUnits::default(),
            headloss: HeadlossFormula::default(),
            viscosity: super::units::WATER_VISCOSITY,
            trials: 200,
            accuracy: 0.001,
            unbalanced: Unbalanced::default(),
            default_pattern: None,
            demand_multiplier: 1.0,
            emitter_exponent: 0.5,
            demand_model: DemandModel::default(),
        }
    }
}

/// Simulation clock settings, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOptions {
    pub duration: u64,
    pub hydraulic_step: u64,
    pub pattern_step: u64,
    pub pattern_start: u64,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            duration: 0,
            hydraulic_step: 3_600,
            pattern_step: 3_600,
            pattern_start: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Network {
    pub title: Vec<String>,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub patterns: Vec<Pattern>,
    pub curves: Vec<Curve>,
    pub options: HydraulicOptions,
    pub times: TimeOptions,
    node_index: HashMap<String, usize>,
    link_index: HashMap<String, usize>,
    pattern_index: HashMap<String, usize>,
    curve_index: HashMap<String, usize>,
}

impl Network {
    pub fn add_node(&mut self, node: Node) -> Result<usize, String> {
        if self.node_index.contains_key(&node.id) {
            return Err(format!("duplicate node id '{}'", node.id));
        }
        let index = self.nodes.len();
        self.node_index.insert(node.id.clone(), index);
        self.nodes.push(node);
        Ok(index)
    }

    pub fn add_link(&mut self, link: Link) -> Result<usize, String> {
        if self.link_index.contains_key(&link.id) {
            return Err(format!("duplicate link id '{}'", link.id));
        }
        let index = self.links.len();
        self.link_index.insert(link.id.clone(), index);
        self.links.push(link);
        Ok(index)
    }

    /// Appends multipliers, creating the pattern on first use.
    pub fn extend_pattern(&mut self, id: &str, multipliers: &[f64]) -> usize {
        if let Some(&index) = self.pattern_index.get(id) {
            self.patterns[index].multipliers.extend_from_slice(multipliers);
            return index;
        }
        let index = self.patterns.len();
        self.pattern_index.insert(id.to_string(), index);
        self.patterns.push(Pattern {
            id: id.to_string(),
            multipliers: multipliers.to_vec(),
        });
        index
    }

    /// Appends a point, creating the curve on first use.
    pub fn extend_curve(&mut self, id: &str, point: (f64, f64)) -> usize {
        if let Some(&index) = self.curve_index.get(id) {
            self.curves[index].points.push(point);
            return index;
        }
        let index = self.curves.len();
        self.curve_index.insert(id.to_string(), index);
        self.curves.push(Curve {
            id: id.to_string(),
            points: vec![point],
        });
        index
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    pub fn link_index(&self, id: &str) -> Option<usize> {
        self.link_index.get(id).copied()
    }

    pub fn pattern_index(&self, id: &str) -> Option<usize> {
        self.pattern_index.get(id).copied()
    }

    pub fn curve_index(&self, id: &str) -> Option<usize> {
        self.curve_index.get(id).copied()
    }

    pub fn junction_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_junction()).count()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Checks that the network can be solved at all.
    pub fn validate(&self) -> HydraulicsResult<()> {
        if self.nodes.is_empty() {
            return Err(HydraulicsError::network("network has no nodes"));
        }
        if self.nodes.iter().all(Node::is_junction) {
            return Err(HydraulicsError::network(
                "network needs at least one reservoir or tank",
            ));
        }
        if self.times.duration > 0 && self.times.hydraulic_step == 0 {
            return Err(HydraulicsError::network(
                "hydraulic timestep must be positive",
            ));
        }
        if self.times.pattern_step == 0 {
            return Err(HydraulicsError::network("pattern timestep must be positive"));
        }

        for node in &self.nodes {
            if let NodeKind::Tank(tank) = &node.kind {
                if tank.diameter <= 0.0 {
                    return Err(HydraulicsError::network(format!(
                        "tank '{}' must have a positive diameter",
                        node.id
                    )));
                }
                if tank.min_level > tank.max_level
                    || tank.initial_level < tank.min_level
                    || tank.initial_level > tank.max_level
                {
                    return Err(HydraulicsError::network(format!(
                        "tank '{}' has inconsistent levels",
                        node.id
                    )));
                }
            }
        }

        for link in &self.links {
            if link.from == link.to {
                return Err(HydraulicsError::network(format!(
                    "link '{}' connects node '{}' to itself",
                    link.id, self.nodes[link.from].id
                )));
            }
            let dimensions_ok = match &link.kind {
                LinkKind::Pipe {
                    length, diameter, ..
                } => *length > 0.0 && *diameter > 0.0,
                LinkKind::Valve { diameter, .. } => *diameter > 0.0,
                LinkKind::Pump { speed, .. } => *speed >= 0.0,
            };
            if !dimensions_ok {
                return Err(HydraulicsError::network(format!(
                    "link '{}' has invalid dimensions",
                    link.id
                )));
            }
        }

        if let Some(node) = self.unsupplied_node() {
            return Err(HydraulicsError::network(format!(
                "node '{}' is not connected to any reservoir or tank",
                self.nodes[node].id
            )));
        }

        Ok(())
    }

    /// First node not reachable from a fixed-grade node through any link.
    fn unsupplied_node(&self) -> Option<usize> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for link in &self.links {
            adjacency[link.from].push(link.to);
            adjacency[link.to].push(link.from);
        }

        let mut reached = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if !node.is_junction() {
                reached[index] = true;
                queue.push_back(index);
            }
        }

        while let Some(index) = queue.pop_front() {
            for &next in &adjacency[index] {
                if !reached[next] {
                    reached[next] = true;
                    queue.push_back(next);
                }
            }
        }

        reached.iter().position(|reached| !reached)
    }
}
