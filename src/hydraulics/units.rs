//! Unit systems of EPANET input files.
//!
//! The flow unit declared in `[OPTIONS]` decides every other unit of the
//! file: US flow units imply feet, inches and psi, SI flow units imply
//! metres, millimetres and metres of water. Internally the engine works in
//! metres and cubic metres per second.

pub const GRAVITY: f64 = 9.806_65;

/// Kinematic viscosity of water at 20 C, m2/s.
pub const WATER_VISCOSITY: f64 = 1.022e-6;

const FEET: f64 = 0.3048;
const INCHES: f64 = 0.0254;
const CUBIC_FEET: f64 = 0.028_316_846_592;
const PSI_TO_METRES: f64 = 0.703_07;
const HORSEPOWER_TO_KW: f64 = 0.745_7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowUnits {
    Cfs,
    #[default]
    Gpm,
    Mgd,
    Imgd,
    Afd,
    Lps,
    Lpm,
    Mld,
    Cmh,
    Cmd,
}

impl FlowUnits {
    pub fn parse(value: &str) -> Option<Self> {
        let units = match value.to_ascii_uppercase().as_str() {
            "CFS" => Self::Cfs,
            "GPM" => Self::Gpm,
            "MGD" => Self::Mgd,
            "IMGD" => Self::Imgd,
            "AFD" => Self::Afd,
            "LPS" => Self::Lps,
            "LPM" => Self::Lpm,
            "MLD" => Self::Mld,
            "CMH" => Self::Cmh,
            "CMD" => Self::Cmd,
            _ => return None,
        };
        Some(units)
    }

    pub fn is_si(self) -> bool {
        matches!(
            self,
            Self::Lps | Self::Lpm | Self::Mld | Self::Cmh | Self::Cmd
        )
    }

    /// Multiplier taking a flow in these units to m3/s.
    pub fn flow(self) -> f64 {
        match self {
            Self::Cfs => CUBIC_FEET,
            Self::Gpm => CUBIC_FEET / 448.831,
            Self::Mgd => CUBIC_FEET * 1.547_23,
            Self::Imgd => CUBIC_FEET * 1.858_16,
            Self::Afd => CUBIC_FEET * 0.504_17,
            Self::Lps => 1.0e-3,
            Self::Lpm => 1.0e-3 / 60.0,
            Self::Mld => 1.0e3 / 86_400.0,
            Self::Cmh => 1.0 / 3_600.0,
            Self::Cmd => 1.0 / 86_400.0,
        }
    }

    /// Multiplier for elevations, heads, lengths and tank levels.
    pub fn length(self) -> f64 {
        if self.is_si() {
            1.0
        } else {
            FEET
        }
    }

    /// Multiplier for pipe, valve and tank-outlet diameters.
    pub fn diameter(self) -> f64 {
        if self.is_si() {
            1.0e-3
        } else {
            INCHES
        }
    }

    /// Multiplier for pressures, to metres of water.
    pub fn pressure(self) -> f64 {
        if self.is_si() {
            1.0
        } else {
            PSI_TO_METRES
        }
    }

    /// Multiplier for Darcy-Weisbach roughness (millifeet or millimetres).
    pub fn roughness(self) -> f64 {
        if self.is_si() {
            1.0e-3
        } else {
            FEET * 1.0e-3
        }
    }

    /// Multiplier for pump power, to kilowatts.
    pub fn power(self) -> f64 {
        if self.is_si() {
            1.0
        } else {
            HORSEPOWER_TO_KW
        }
    }
}
