//! Reader for EPANET `.inp` network files.
//!
//! The file is split into sections first and the sections are then applied
//! in dependency order, so nodes may be declared after the links that
//! reference them and options may appear anywhere.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{HydraulicsError, HydraulicsResult};
use super::network::{
    Demand, DemandModelKind, HeadlossFormula, Link, LinkKind, LinkStatus, Network, Node,
    NodeKind, PumpCurve, Tank, Unbalanced, ValveType,
};
use super::units::{FlowUnits, WATER_VISCOSITY};

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d{1,2})(?::(\d{1,2}))?$").expect("clock time pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Title,
    Junctions,
    Reservoirs,
    Tanks,
    Pipes,
    Pumps,
    Valves,
    Demands,
    Status,
    Patterns,
    Curves,
    Emitters,
    Options,
    Times,
    Skipped,
}

impl Section {
    fn from_header(name: &str) -> Option<Self> {
        let section = match name.to_ascii_uppercase().as_str() {
            "TITLE" => Self::Title,
            "JUNCTIONS" => Self::Junctions,
            "RESERVOIRS" => Self::Reservoirs,
            "TANKS" => Self::Tanks,
            "PIPES" => Self::Pipes,
            "PUMPS" => Self::Pumps,
            "VALVES" => Self::Valves,
            "DEMANDS" => Self::Demands,
            "STATUS" => Self::Status,
            "PATTERNS" => Self::Patterns,
            "CURVES" => Self::Curves,
            "EMITTERS" => Self::Emitters,
            "OPTIONS" => Self::Options,
            "TIMES" => Self::Times,
            "CONTROLS" | "RULES" | "ENERGY" | "QUALITY" | "SOURCES" | "REACTIONS" | "MIXING"
            | "REPORT" | "COORDINATES" | "VERTICES" | "LABELS" | "BACKDROP" | "TAGS"
            | "LEAKAGE" => Self::Skipped,
            _ => return None,
        };
        Some(section)
    }
}

struct Line<'a> {
    number: usize,
    text: &'a str,
    tokens: Vec<&'a str>,
}

impl<'a> Line<'a> {
    fn field(&self, index: usize, what: &str) -> HydraulicsResult<&'a str> {
        self.tokens
            .get(index)
            .copied()
            .ok_or_else(|| HydraulicsError::input(self.number, format!("missing {what}")))
    }

    fn number(&self, index: usize, what: &str) -> HydraulicsResult<f64> {
        let value = self.field(index, what)?;
        value
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .ok_or_else(|| {
                HydraulicsError::input(self.number, format!("invalid {what} '{value}'"))
            })
    }

    fn optional_number(&self, index: usize, what: &str) -> HydraulicsResult<Option<f64>> {
        if index < self.tokens.len() {
            self.number(index, what).map(Some)
        } else {
            Ok(None)
        }
    }

    fn error(&self, what: impl Into<String>) -> HydraulicsError {
        HydraulicsError::input(self.number, what)
    }
}

/// Reads and parses an input file from disk.
pub fn read_inp(path: &Path) -> HydraulicsResult<Network> {
    let text = std::fs::read_to_string(path).map_err(|source| HydraulicsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_inp(&text)
}

pub fn parse_inp(text: &str) -> HydraulicsResult<Network> {
    let mut sections = split_sections(text)?;
    let mut take = |section: Section| sections.remove(&section).unwrap_or_default();

    let mut network = Network::default();
    network.title = take(Section::Title)
        .into_iter()
        .map(|line| line.text.to_string())
        .collect();

    let default_pattern = parse_options(&mut network, &take(Section::Options))?;
    parse_times(&mut network, &take(Section::Times))?;
    for line in take(Section::Patterns) {
        let multipliers = (1..line.tokens.len())
            .map(|index| line.number(index, "pattern multiplier"))
            .collect::<HydraulicsResult<Vec<_>>>()?;
        network.extend_pattern(line.field(0, "pattern id")?, &multipliers);
    }
    for line in take(Section::Curves) {
        let point = (line.number(1, "curve x value")?, line.number(2, "curve y value")?);
        network.extend_curve(line.field(0, "curve id")?, point);
    }
    network.options.default_pattern = match default_pattern {
        Some((line, id)) => Some(
            network
                .pattern_index(&id)
                .ok_or_else(|| HydraulicsError::input(line, format!("unknown pattern '{id}'")))?,
        ),
        None => network.pattern_index("1"),
    };

    parse_junctions(&mut network, &take(Section::Junctions))?;
    parse_reservoirs(&mut network, &take(Section::Reservoirs))?;
    parse_tanks(&mut network, &take(Section::Tanks))?;
    parse_pipes(&mut network, &take(Section::Pipes))?;
    parse_pumps(&mut network, &take(Section::Pumps))?;
    parse_valves(&mut network, &take(Section::Valves))?;
    parse_demands(&mut network, &take(Section::Demands))?;
    parse_emitters(&mut network, &take(Section::Emitters))?;
    parse_status(&mut network, &take(Section::Status))?;

    Ok(network)
}

fn split_sections(text: &str) -> HydraulicsResult<HashMap<Section, Vec<Line<'_>>>> {
    let mut sections: HashMap<Section, Vec<Line<'_>>> = HashMap::new();
    let mut current = None;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    for (index, raw) in text.lines().enumerate() {
        let number = index + 1;
        let content = strip_comment(raw).trim();
        if content.is_empty() {
            continue;
        }

        if let Some(header) = content.strip_prefix('[') {
            let name = header
                .split(']')
                .next()
                .map(str::trim)
                .unwrap_or_default();
            if name.eq_ignore_ascii_case("END") {
                break;
            }
            current = Some(Section::from_header(name).ok_or_else(|| {
                HydraulicsError::input(number, format!("unknown section [{name}]"))
            })?);
            continue;
        }

        let Some(section) = current else {
            return Err(HydraulicsError::input(number, "data outside of a section"));
        };
        if section == Section::Skipped {
            continue;
        }

        sections.entry(section).or_default().push(Line {
            number,
            text: content,
            tokens: tokenize(content),
        });
    }

    Ok(sections)
}

/// Cuts the line at the first `;` that is not inside double quotes.
fn strip_comment(raw: &str) -> &str {
    let mut quoted = false;
    for (position, ch) in raw.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ';' if !quoted => return &raw[..position],
            _ => {}
        }
    }
    raw
}

/// Splits on whitespace; a double-quoted field is one token without its quotes.
fn tokenize(content: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = content.trim_start();

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            tokens.push(&quoted[..end]);
            rest = quoted.get(end + 1..).unwrap_or_default();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            tokens.push(&rest[..end]);
            rest = &rest[end..];
        }
        rest = rest.trim_start();
    }

    tokens
}

fn upper(line: &Line<'_>, index: usize) -> String {
    line.tokens
        .get(index)
        .map(|token| token.to_ascii_uppercase())
        .unwrap_or_default()
}

fn parse_options(
    network: &mut Network,
    lines: &[Line<'_>],
) -> HydraulicsResult<Option<(usize, String)>> {
    let mut default_pattern = None;

    // Units first: emitter and pressure conversions depend on them.
    for line in lines {
        if upper(line, 0) == "UNITS" {
            let value = line.field(1, "flow units")?;
            network.options.flow_units = FlowUnits::parse(value)
                .ok_or_else(|| line.error(format!("unknown flow units '{value}'")))?;
        }
    }

    let options = &mut network.options;
    for line in lines {
        match (upper(line, 0).as_str(), upper(line, 1).as_str()) {
            ("UNITS", _) => {}
            ("HEADLOSS", value) => {
                options.headloss = match value {
                    "H-W" => HeadlossFormula::HazenWilliams,
                    "D-W" => HeadlossFormula::DarcyWeisbach,
                    "C-M" => HeadlossFormula::ChezyManning,
                    _ => return Err(line.error(format!("unknown headloss formula '{value}'"))),
                }
            }
            ("VISCOSITY", _) => {
                options.viscosity = line.number(1, "viscosity")? * WATER_VISCOSITY;
            }
            ("TRIALS", _) => {
                let trials = line.number(1, "trials")?;
                if trials < 1.0 {
                    return Err(line.error("trials must be at least 1"));
                }
                options.trials = trials as usize;
            }
            ("ACCURACY", _) => {
                let accuracy = line.number(1, "accuracy")?;
                if accuracy <= 0.0 {
                    return Err(line.error("accuracy must be positive"));
                }
                options.accuracy = accuracy;
            }
            ("UNBALANCED", "STOP") => options.unbalanced = Unbalanced::Stop,
            ("UNBALANCED", "CONTINUE") => {
                let extra = line.optional_number(2, "extra trials")?.unwrap_or(0.0);
                options.unbalanced = Unbalanced::Continue(extra.max(0.0) as usize);
            }
            ("PATTERN", _) => {
                default_pattern = Some((line.number, line.field(1, "pattern id")?.to_string()));
            }
            ("DEMAND", "MULTIPLIER") => {
                options.demand_multiplier = line.number(2, "demand multiplier")?;
            }
            ("DEMAND", "MODEL") => {
                let value = line.field(2, "demand model")?;
                options.demand_model.kind = DemandModelKind::parse(value)
                    .ok_or_else(|| line.error(format!("unknown demand model '{value}'")))?;
            }
            ("EMITTER", "EXPONENT") => {
                let exponent = line.number(2, "emitter exponent")?;
                if exponent <= 0.0 {
                    return Err(line.error("emitter exponent must be positive"));
                }
                options.emitter_exponent = exponent;
            }
            ("MINIMUM", "PRESSURE") => {
                options.demand_model.minimum_pressure = line.number(2, "minimum pressure")?;
            }
            ("REQUIRED", "PRESSURE") => {
                options.demand_model.required_pressure = line.number(2, "required pressure")?;
            }
            ("PRESSURE", "EXPONENT") => {
                options.demand_model.pressure_exponent = line.number(2, "pressure exponent")?;
            }
            _ => {}
        }
    }

    Ok(default_pattern)
}

/// Parses `h`, `h:mm`, `h:mm:ss`, decimal hours, or a value with a unit.
fn parse_time(tokens: &[&str]) -> Option<u64> {
    let value = *tokens.first()?;
    if let Some(unit) = tokens.get(1) {
        let amount = value.parse::<f64>().ok().filter(|amount| *amount >= 0.0)?;
        let unit = unit.to_ascii_uppercase();
        let scale = if unit.starts_with("SEC") {
            1.0
        } else if unit.starts_with("MIN") {
            60.0
        } else if unit.starts_with("HOU") {
            3_600.0
        } else if unit.starts_with("DAY") {
            86_400.0
        } else {
            return None;
        };
        return Some((amount * scale).round() as u64);
    }

    if let Some(captures) = CLOCK_TIME.captures(value) {
        let part = |index: usize| {
            captures
                .get(index)
                .and_then(|part| part.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        };
        return Some(part(1) * 3_600 + part(2) * 60 + part(3));
    }

    let hours = value.parse::<f64>().ok().filter(|hours| *hours >= 0.0)?;
    Some((hours * 3_600.0).round() as u64)
}

fn parse_times(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    for line in lines {
        let (slot, value_start) = match (upper(line, 0).as_str(), upper(line, 1).as_str()) {
            ("DURATION", _) => (&mut network.times.duration, 1),
            ("HYDRAULIC", "TIMESTEP") => (&mut network.times.hydraulic_step, 2),
            ("PATTERN", "TIMESTEP") => (&mut network.times.pattern_step, 2),
            ("PATTERN", "START") => (&mut network.times.pattern_start, 2),
            _ => continue,
        };
        *slot = parse_time(&line.tokens[value_start.min(line.tokens.len())..])
            .ok_or_else(|| line.error(format!("invalid time value '{}'", line.text)))?;
    }

    let times = &mut network.times;
    if times.pattern_step > 0 && times.hydraulic_step > times.pattern_step {
        times.hydraulic_step = times.pattern_step;
    }
    Ok(())
}

fn pattern_ref(network: &Network, line: &Line<'_>, index: usize) -> HydraulicsResult<Option<usize>> {
    match line.tokens.get(index) {
        Some(id) => network
            .pattern_index(id)
            .map(Some)
            .ok_or_else(|| line.error(format!("unknown pattern '{id}'"))),
        None => Ok(None),
    }
}

fn node_ref(network: &Network, line: &Line<'_>, index: usize) -> HydraulicsResult<usize> {
    let id = line.field(index, "node id")?;
    network
        .node_index(id)
        .ok_or_else(|| line.error(format!("unknown node '{id}'")))
}

fn add_node(network: &mut Network, line: &Line<'_>, node: Node) -> HydraulicsResult<()> {
    network.add_node(node).map(|_| ()).map_err(|what| line.error(what))
}

fn add_link(network: &mut Network, line: &Line<'_>, link: Link) -> HydraulicsResult<()> {
    network.add_link(link).map(|_| ()).map_err(|what| line.error(what))
}

fn parse_junctions(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let units = network.options.flow_units;
    for line in lines {
        let base = line.optional_number(2, "demand")?.unwrap_or(0.0) * units.flow();
        let pattern = pattern_ref(network, line, 3)?.or(network.options.default_pattern);
        let node = Node {
            id: line.field(0, "junction id")?.to_string(),
            elevation: line.number(1, "elevation")? * units.length(),
            emitter: 0.0,
            kind: NodeKind::Junction {
                demands: vec![Demand { base, pattern }],
            },
        };
        add_node(network, line, node)?;
    }
    Ok(())
}

fn parse_reservoirs(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let units = network.options.flow_units;
    for line in lines {
        let head = line.number(1, "head")? * units.length();
        let node = Node {
            id: line.field(0, "reservoir id")?.to_string(),
            elevation: head,
            emitter: 0.0,
            kind: NodeKind::Reservoir {
                head,
                pattern: pattern_ref(network, line, 2)?,
            },
        };
        add_node(network, line, node)?;
    }
    Ok(())
}

fn parse_tanks(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let length = network.options.flow_units.length();
    for line in lines {
        let node = Node {
            id: line.field(0, "tank id")?.to_string(),
            elevation: line.number(1, "elevation")? * length,
            emitter: 0.0,
            kind: NodeKind::Tank(Tank {
                initial_level: line.number(2, "initial level")? * length,
                min_level: line.number(3, "minimum level")? * length,
                max_level: line.number(4, "maximum level")? * length,
                diameter: line.number(5, "diameter")? * length,
            }),
        };
        add_node(network, line, node)?;
    }
    Ok(())
}

fn parse_pipes(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let units = network.options.flow_units;
    let roughness_scale = match network.options.headloss {
        HeadlossFormula::DarcyWeisbach => units.roughness(),
        HeadlossFormula::HazenWilliams | HeadlossFormula::ChezyManning => 1.0,
    };

    for line in lines {
        let roughness = line.number(5, "roughness")?;
        if roughness <= 0.0 {
            return Err(line.error("roughness must be positive"));
        }
        let (status, check_valve) = match upper(line, 7).as_str() {
            "" | "OPEN" => (LinkStatus::Open, false),
            "CLOSED" => (LinkStatus::Closed, false),
            "CV" => (LinkStatus::Open, true),
            other => return Err(line.error(format!("unknown pipe status '{other}'"))),
        };
        let link = Link {
            id: line.field(0, "pipe id")?.to_string(),
            from: node_ref(network, line, 1)?,
            to: node_ref(network, line, 2)?,
            status,
            kind: LinkKind::Pipe {
                length: line.number(3, "length")? * units.length(),
                diameter: line.number(4, "diameter")? * units.diameter(),
                roughness: roughness * roughness_scale,
                minor_loss: line.optional_number(6, "minor loss")?.unwrap_or(0.0),
                check_valve,
            },
        };
        add_link(network, line, link)?;
    }
    Ok(())
}

fn parse_pumps(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let units = network.options.flow_units;
    for line in lines {
        let mut curve = None;
        let mut speed = 1.0;
        let mut pattern = None;

        let mut index = 3;
        while index < line.tokens.len() {
            let keyword = upper(line, index);
            match keyword.as_str() {
                "HEAD" => {
                    let id = line.field(index + 1, "head curve id")?;
                    let curve_index = network
                        .curve_index(id)
                        .ok_or_else(|| line.error(format!("unknown curve '{id}'")))?;
                    let points: Vec<(f64, f64)> = network.curves[curve_index]
                        .points
                        .iter()
                        .map(|(flow, head)| (flow * units.flow(), head * units.length()))
                        .collect();
                    curve = Some(PumpCurve::fit(&points).map_err(|what| {
                        line.error(format!("pump curve '{id}': {what}"))
                    })?);
                }
                "POWER" => {
                    let power = line.number(index + 1, "pump power")?;
                    if power <= 0.0 {
                        return Err(line.error("pump power must be positive"));
                    }
                    curve = Some(PumpCurve::Power {
                        kilowatts: power * units.power(),
                    });
                }
                "SPEED" => speed = line.number(index + 1, "pump speed")?,
                "PATTERN" => pattern = pattern_ref(network, line, index + 1)?,
                other => return Err(line.error(format!("unknown pump keyword '{other}'"))),
            }
            index += 2;
        }

        let curve = curve.ok_or_else(|| line.error("pump needs a HEAD curve or POWER"))?;
        let link = Link {
            id: line.field(0, "pump id")?.to_string(),
            from: node_ref(network, line, 1)?,
            to: node_ref(network, line, 2)?,
            status: LinkStatus::Open,
            kind: LinkKind::Pump {
                curve,
                speed,
                pattern,
            },
        };
        add_link(network, line, link)?;
    }
    Ok(())
}

fn parse_valves(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let units = network.options.flow_units;
    for line in lines {
        let kind = line.field(4, "valve type")?;
        let valve_type =
            ValveType::parse(kind).ok_or_else(|| line.error(format!("unknown valve type '{kind}'")))?;
        let setting = match valve_type {
            // GPV settings name a head-loss curve.
            ValveType::Gpv => 0.0,
            _ => line.number(5, "valve setting")?,
        };
        let link = Link {
            id: line.field(0, "valve id")?.to_string(),
            from: node_ref(network, line, 1)?,
            to: node_ref(network, line, 2)?,
            status: LinkStatus::Open,
            kind: LinkKind::Valve {
                valve_type,
                diameter: line.number(3, "diameter")? * units.diameter(),
                setting,
                minor_loss: line.optional_number(6, "minor loss")?.unwrap_or(0.0),
            },
        };
        add_link(network, line, link)?;
    }
    Ok(())
}

fn parse_demands(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let flow = network.options.flow_units.flow();
    let mut replaced = HashSet::new();

    for line in lines {
        let node = node_ref(network, line, 0)?;
        let base = line.number(1, "demand")? * flow;
        let pattern = pattern_ref(network, line, 2)?.or(network.options.default_pattern);
        let NodeKind::Junction { demands } = &mut network.nodes[node].kind else {
            return Err(line.error("demands can only be assigned to junctions"));
        };
        // The first [DEMANDS] entry replaces the demand given in [JUNCTIONS].
        if replaced.insert(node) {
            demands.clear();
        }
        demands.push(Demand { base, pattern });
    }
    Ok(())
}

fn parse_emitters(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    let units = network.options.flow_units;
    let exponent = network.options.emitter_exponent;
    for line in lines {
        let node = node_ref(network, line, 0)?;
        let coefficient = line.number(1, "emitter coefficient")?;
        if coefficient < 0.0 {
            return Err(line.error("emitter coefficient must not be negative"));
        }
        if !network.nodes[node].is_junction() {
            return Err(line.error("emitters can only be placed on junctions"));
        }
        network.nodes[node].emitter =
            coefficient * units.flow() / units.pressure().powf(exponent);
    }
    Ok(())
}

fn parse_status(network: &mut Network, lines: &[Line<'_>]) -> HydraulicsResult<()> {
    for line in lines {
        let id = line.field(0, "link id")?;
        let index = network
            .link_index(id)
            .ok_or_else(|| line.error(format!("unknown link '{id}'")))?;
        let value = upper(line, 1);
        let link = &mut network.links[index];

        match value.as_str() {
            "OPEN" => link.status = LinkStatus::Open,
            "CLOSED" => link.status = LinkStatus::Closed,
            _ => {
                let number = line.number(1, "status value")?;
                match &mut link.kind {
                    LinkKind::Pump { speed, .. } => {
                        *speed = number;
                        link.status = if number == 0.0 {
                            LinkStatus::Closed
                        } else {
                            LinkStatus::Open
                        };
                    }
                    LinkKind::Valve { setting, .. } => *setting = number,
                    LinkKind::Pipe { .. } => {
                        return Err(line.error(format!("pipe '{id}' cannot take a setting")))
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_NETWORK: &str = "\
[TITLE]
Two junction test network

[JUNCTIONS]
;ID  Elev  Demand  Pattern
 J1  10    5       P1
 J2  12    3

[RESERVOIRS]
 R1  60

[PIPES]
 P1  R1  J1  1000  300  130
 P2  J1  J2  500   200  120  0  CV

[PATTERNS]
 P1  0.5  1.0
 P1  1.5

[OPTIONS]
 Units     LPS
 Headloss  H-W

[TIMES]
 Duration            6:00
 Hydraulic Timestep  0:30
 Pattern Timestep    1 HOURS

[COORDINATES]
 J1  1  2

[END]
";

    #[test]
    fn parses_small_network() {
        let network = parse_inp(SMALL_NETWORK).expect("valid network");

        assert_eq!(network.title, vec!["Two junction test network"]);
        assert_eq!(network.nodes.len(), 3);
        assert_eq!(network.junction_count(), 2);
        assert_eq!(network.link_count(), 2);
        assert_eq!(network.options.flow_units, FlowUnits::Lps);
        assert_eq!(network.patterns[0].multipliers, vec![0.5, 1.0, 1.5]);
        assert_eq!(network.times.duration, 6 * 3_600);
        assert_eq!(network.times.hydraulic_step, 1_800);
        assert_eq!(network.times.pattern_step, 3_600);

        let NodeKind::Junction { demands } = &network.nodes[0].kind else {
            panic!("J1 should be a junction");
        };
        assert!((demands[0].base - 0.005).abs() < 1e-12);
        assert_eq!(demands[0].pattern, Some(0));

        let LinkKind::Pipe {
            diameter,
            check_valve,
            ..
        } = &network.links[1].kind
        else {
            panic!("P2 should be a pipe");
        };
        assert!((diameter - 0.2).abs() < 1e-12);
        assert!(check_valve);
    }

    #[test]
    fn links_may_precede_nodes() {
        let text = "[PIPES]\nP1 R1 J1 100 300 100\n[JUNCTIONS]\nJ1 0\n[RESERVOIRS]\nR1 10\n";
        let network = parse_inp(text).expect("order independent sections");
        assert_eq!(network.links[0].from, network.node_index("R1").expect("R1"));
    }

    #[test]
    fn leading_byte_order_mark_is_ignored() {
        let text = "\u{feff}[JUNCTIONS]\nJ1 0\n[RESERVOIRS]\nR1 10\n[PIPES]\nP1 R1 J1 100 300 100\n";
        let network = parse_inp(text).expect("BOM before first header");
        assert_eq!(network.junction_count(), 1);
        assert_eq!(network.link_count(), 1);
    }

    #[test]
    fn quoted_ids_may_contain_spaces() {
        let text = "\
[JUNCTIONS]
\"Main St\"  5  2  ; tail comment
[RESERVOIRS]
\"Lake;North\"  40
[PIPES]
\"Pipe 1\"  \"Lake;North\"  \"Main St\"  100  300  100
";
        let network = parse_inp(text).expect("quoted identifiers");

        let junction = network.node_index("Main St").expect("Main St");
        let lake = network.node_index("Lake;North").expect("Lake;North");
        let pipe = network.link_index("Pipe 1").expect("Pipe 1");
        assert_eq!(network.links[pipe].from, lake);
        assert_eq!(network.links[pipe].to, junction);
    }

    #[test]
    fn tokenizer_handles_quotes_and_comments() {
        assert_eq!(tokenize(r#" "A B"  C  "" D"#), vec!["A B", "C", "", "D"]);
        assert_eq!(tokenize(r#""unterminated id"#), vec!["unterminated id"]);
        assert_eq!(strip_comment(r#"X "a;b" ; note"#), r#"X "a;b" "#);
    }

    #[test]
    fn reports_unknown_node_with_line_number() {
        let text = "[JUNCTIONS]\nJ1 0\n[PIPES]\nP1 J1 J9 100 300 100\n";
        let error = parse_inp(text).expect_err("unknown node");
        assert_eq!(error.to_string(), "input error at line 4: unknown node 'J9'");
    }

    #[test]
    fn reports_bad_number() {
        let text = "[JUNCTIONS]\nJ1 high\n";
        let error = parse_inp(text).expect_err("bad elevation");
        assert!(error.to_string().contains("invalid elevation 'high'"));
    }

    #[test]
    fn rejects_unknown_section() {
        let error = parse_inp("[PIPEZ]\n").expect_err("unknown section");
        assert!(error.to_string().contains("unknown section [PIPEZ]"));
    }

    #[test]
    fn rejects_data_before_first_section() {
        let error = parse_inp("J1 10\n").expect_err("orphan data");
        assert!(error.to_string().contains("outside of a section"));
    }

    #[test]
    fn demands_section_replaces_junction_demand() {
        let text = "\
[JUNCTIONS]
J1 0 10
[RESERVOIRS]
R1 10
[PIPES]
P1 R1 J1 100 300 100
[DEMANDS]
J1 4
J1 6
";
        let network = parse_inp(text).expect("valid network");
        let NodeKind::Junction { demands } = &network.nodes[0].kind else {
            panic!("junction expected");
        };
        let total: f64 = demands.iter().map(|demand| demand.base).sum();
        // GPM is the default flow unit.
        assert!((total - 10.0 * FlowUnits::Gpm.flow()).abs() < 1e-12);
        assert_eq!(demands.len(), 2);
    }

    #[test]
    fn parses_pump_with_head_curve_and_status() {
        let text = "\
[JUNCTIONS]
J1 0
[RESERVOIRS]
R1 0
[PUMPS]
PU1 R1 J1 HEAD C1
[CURVES]
C1 10 30
[STATUS]
PU1 0.8
";
        let network = parse_inp(text).expect("valid network");
        let LinkKind::Pump { speed, curve, .. } = &network.links[0].kind else {
            panic!("pump expected");
        };
        assert_eq!(*speed, 0.8);
        assert!(matches!(curve, PumpCurve::Function { .. }));
    }

    #[test]
    fn pump_without_curve_is_rejected() {
        let text = "[JUNCTIONS]\nJ1 0\n[RESERVOIRS]\nR1 0\n[PUMPS]\nPU1 R1 J1\n";
        let error = parse_inp(text).expect_err("pump without curve");
        assert!(error.to_string().contains("HEAD curve or POWER"));
    }

    #[test]
    fn parses_demand_model_options() {
        let text = "\
[OPTIONS]
DEMAND MODEL PDA
MINIMUM PRESSURE 5
REQUIRED PRESSURE 20
PRESSURE EXPONENT 0.5
UNBALANCED CONTINUE 10
";
        let network = parse_inp(text).expect("options only");
        let model = network.options.demand_model;
        assert_eq!(model.kind, DemandModelKind::Pda);
        assert_eq!(model.minimum_pressure, 5.0);
        assert_eq!(model.required_pressure, 20.0);
        assert_eq!(network.options.unbalanced, Unbalanced::Continue(10));
    }

    #[test]
    fn parses_time_formats() {
        assert_eq!(parse_time(&["24:00"]), Some(86_400));
        assert_eq!(parse_time(&["1:30:15"]), Some(5_415));
        assert_eq!(parse_time(&["1.5"]), Some(5_400));
        assert_eq!(parse_time(&["15", "MIN"]), Some(900));
        assert_eq!(parse_time(&["2", "days"]), Some(172_800));
        assert_eq!(parse_time(&["soon"]), None);
    }

    #[test]
    fn hydraulic_step_is_capped_by_pattern_step() {
        let text = "[TIMES]\nHYDRAULIC TIMESTEP 2:00\nPATTERN TIMESTEP 1:00\n";
        let network = parse_inp(text).expect("times only");
        assert_eq!(network.times.hydraulic_step, 3_600);
    }
}
