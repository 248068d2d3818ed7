//! Head-loss laws for links and pseudo-links.
//!
//! Every law returns the head loss in the direction of positive flow and
//! its derivative with respect to flow, which is what the gradient solver
//! needs. Pumps report head gain as negative loss.

use std::f64::consts::PI;

use super::network::{HeadlossFormula, HydraulicOptions, Link, LinkKind, PumpCurve, ValveType};
use super::units::GRAVITY;

/// Resistance of a closed link, m per m3/s.
pub const CLOSED_RESISTANCE: f64 = 1.0e8;
/// Lower bound on any loss gradient, m per m3/s.
pub const MIN_GRADIENT: f64 = 1.0e-6;
/// Slope outside the feasible range of a pressure driven demand.
const DEMAND_BARRIER: f64 = 1.0e6;
/// Smallest flow used when evaluating a constant power pump.
const MIN_POWER_FLOW: f64 = 1.0e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkLoss {
    pub headloss: f64,
    pub gradient: f64,
}

impl LinkLoss {
    fn floored(headloss: f64, gradient: f64, flow: f64) -> Self {
        if gradient < MIN_GRADIENT {
            Self {
                headloss: MIN_GRADIENT * flow,
                gradient: MIN_GRADIENT,
            }
        } else {
            Self { headloss, gradient }
        }
    }

    pub fn closed(flow: f64) -> Self {
        Self {
            headloss: CLOSED_RESISTANCE * flow,
            gradient: CLOSED_RESISTANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Friction {
    HazenWilliams { resistance: f64 },
    ChezyManning { resistance: f64 },
    DarcyWeisbach {
        length: f64,
        diameter: f64,
        roughness: f64,
        viscosity: f64,
    },
}

/// Precomputed loss law of one link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkModel {
    Pipe { friction: Friction, minor: f64 },
    Pump { curve: PumpCurve },
    Valve { minor: f64 },
}

fn minor_coefficient(k: f64, diameter: f64) -> f64 {
    8.0 * k / (GRAVITY * PI * PI * diameter.powi(4))
}

impl LinkModel {
    pub fn new(link: &Link, options: &HydraulicOptions) -> Self {
        match &link.kind {
            LinkKind::Pipe {
                length,
                diameter,
                roughness,
                minor_loss,
                ..
            } => {
                let friction = match options.headloss {
                    HeadlossFormula::HazenWilliams => Friction::HazenWilliams {
                        resistance: 10.667 * length
                            / (roughness.powf(1.852) * diameter.powf(4.871)),
                    },
                    HeadlossFormula::ChezyManning => Friction::ChezyManning {
                        resistance: 10.294 * roughness * roughness * length
                            / diameter.powf(16.0 / 3.0),
                    },
                    HeadlossFormula::DarcyWeisbach => Friction::DarcyWeisbach {
                        length: *length,
                        diameter: *diameter,
                        roughness: *roughness,
                        viscosity: options.viscosity,
                    },
                };
                Self::Pipe {
                    friction,
                    minor: minor_coefficient(*minor_loss, *diameter),
                }
            }
            LinkKind::Pump { curve, .. } => Self::Pump {
                curve: curve.clone(),
            },
            LinkKind::Valve {
                valve_type,
                diameter,
                setting,
                minor_loss,
            } => {
                let k = match valve_type {
                    ValveType::Tcv => *setting,
                    _ => *minor_loss,
                };
                Self::Valve {
                    minor: minor_coefficient(k.max(0.0), *diameter),
                }
            }
        }
    }

    /// Loss for an open link carrying `flow`; `speed` only affects pumps.
    pub fn evaluate(&self, flow: f64, speed: f64) -> LinkLoss {
        match self {
            Self::Pipe { friction, minor } => {
                let (headloss, gradient) = friction_loss(friction, flow);
                let magnitude = flow.abs();
                LinkLoss::floored(
                    headloss + minor * flow * magnitude,
                    gradient + 2.0 * minor * magnitude,
                    flow,
                )
            }
            Self::Valve { minor } => {
                let magnitude = flow.abs();
                LinkLoss::floored(minor * flow * magnitude, 2.0 * minor * magnitude, flow)
            }
            Self::Pump { curve } => pump_loss(curve, flow, speed),
        }
    }
}

fn friction_loss(friction: &Friction, flow: f64) -> (f64, f64) {
    let magnitude = flow.abs();
    match friction {
        Friction::HazenWilliams { resistance } => {
            let scaled = resistance * magnitude.powf(0.852);
            (scaled * flow, 1.852 * scaled)
        }
        Friction::ChezyManning { resistance } => {
            (resistance * flow * magnitude, 2.0 * resistance * magnitude)
        }
        Friction::DarcyWeisbach {
            length,
            diameter,
            roughness,
            viscosity,
        } => {
            let area = PI * diameter * diameter / 4.0;
            let reynolds = magnitude / area * diameter / viscosity;
            if reynolds < 2_000.0 {
                let laminar = 128.0 * viscosity * length / (GRAVITY * PI * diameter.powi(4));
                return (laminar * flow, laminar);
            }
            let factor = darcy_friction_factor(reynolds, roughness / diameter);
            let resistance = 8.0 * factor * length / (GRAVITY * PI * PI * diameter.powi(5));
            (resistance * flow * magnitude, 2.0 * resistance * magnitude)
        }
    }
}

/// Swamee-Jain in turbulent flow, linear blend across the transition zone.
fn darcy_friction_factor(reynolds: f64, relative_roughness: f64) -> f64 {
    let swamee_jain = |reynolds: f64| {
        0.25 / (relative_roughness / 3.7 + 5.74 / reynolds.powf(0.9))
            .log10()
            .powi(2)
    };
    if reynolds >= 4_000.0 {
        return swamee_jain(reynolds);
    }
    let laminar = 64.0 / 2_000.0;
    let weight = (reynolds - 2_000.0) / 2_000.0;
    laminar + weight * (swamee_jain(4_000.0) - laminar)
}

fn pump_loss(curve: &PumpCurve, flow: f64, speed: f64) -> LinkLoss {
    if speed <= 0.0 {
        return LinkLoss::closed(flow);
    }
    match curve {
        PumpCurve::Power { kilowatts } => {
            let flow = flow.max(MIN_POWER_FLOW);
            let gain = kilowatts / (GRAVITY * flow);
            LinkLoss::floored(-gain, gain / flow, flow)
        }
        PumpCurve::Function {
            shutoff,
            coefficient,
            exponent,
        } => {
            let positive = flow.max(0.0);
            let scale = coefficient * speed.powf(2.0 - exponent);
            let gain = speed * speed * shutoff - scale * positive.powf(*exponent);
            let gradient = exponent * scale * positive.powf(exponent - 1.0);
            if positive == 0.0 || gradient < MIN_GRADIENT {
                LinkLoss {
                    headloss: -gain + MIN_GRADIENT * (flow - positive),
                    gradient: MIN_GRADIENT,
                }
            } else {
                LinkLoss {
                    headloss: -gain,
                    gradient,
                }
            }
        }
        PumpCurve::Table { points } => {
            let scaled_flow = flow.max(0.0) / speed;
            let segment = points
                .windows(2)
                .position(|pair| scaled_flow <= pair[1].0)
                .unwrap_or(points.len() - 2);
            let (q1, h1) = points[segment];
            let (q2, h2) = points[segment + 1];
            let slope = (h2 - h1) / (q2 - q1);
            let head = h1 + slope * (scaled_flow - q1);
            LinkLoss {
                headloss: -speed * speed * head,
                gradient: (-speed * slope).max(MIN_GRADIENT),
            }
        }
    }
}

/// Emitter outflow as a pseudo-link from the node to its own elevation.
pub fn emitter_loss(flow: f64, coefficient: f64, exponent: f64) -> LinkLoss {
    let magnitude = flow.abs();
    if magnitude == 0.0 {
        return LinkLoss::floored(0.0, 0.0, flow);
    }
    let headloss = (magnitude / coefficient).powf(1.0 / exponent);
    LinkLoss::floored(
        headloss.copysign(flow),
        headloss / (exponent * magnitude),
        flow,
    )
}

/// Pressure driven demand as a pseudo-link to a virtual reservoir placed at
/// the minimum pressure head; `range` is required minus minimum pressure.
pub fn pressure_demand_loss(flow: f64, full_demand: f64, range: f64, exponent: f64) -> LinkLoss {
    if flow <= 0.0 {
        return LinkLoss {
            headloss: DEMAND_BARRIER * flow,
            gradient: DEMAND_BARRIER,
        };
    }
    if flow >= full_demand {
        return LinkLoss {
            headloss: range + DEMAND_BARRIER * (flow - full_demand),
            gradient: DEMAND_BARRIER,
        };
    }
    let ratio = flow / full_demand;
    let headloss = range * ratio.powf(1.0 / exponent);
    LinkLoss::floored(headloss, headloss / (exponent * flow), flow)
}
