//! Canonical schema: the closed, enumerated set of target fields.
//!
//! Every raw vendor spec is ultimately mapped toward one of these fields. The
//! set is fixed at compile time; aliases and parsers can only point *at* a
//! [`CanonicalField`], never invent a new one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Units
// ============================================================================

/// Physical dimension of a unit. Conversion is only defined within a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Length,
    Power,
    Fraction,
    Frequency,
    Angle,
    Time,
    Temperature,
    Dimensionless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Picometer,
    Nanometer,
    Micrometer,
    Millimeter,
    Centimeter,
    Meter,
    Microwatt,
    Milliwatt,
    Watt,
    Percent,
    Hertz,
    Kilohertz,
    Megahertz,
    Gigahertz,
    Microradian,
    Milliradian,
    Radian,
    Degree,
    Millisecond,
    Second,
    Minute,
    Hour,
    Celsius,
    Dimensionless,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Picometer
            | Unit::Nanometer
            | Unit::Micrometer
            | Unit::Millimeter
            | Unit::Centimeter
            | Unit::Meter => Dimension::Length,
            Unit::Microwatt | Unit::Milliwatt | Unit::Watt => Dimension::Power,
            Unit::Percent => Dimension::Fraction,
            Unit::Hertz | Unit::Kilohertz | Unit::Megahertz | Unit::Gigahertz => {
                Dimension::Frequency
            }
            Unit::Microradian | Unit::Milliradian | Unit::Radian | Unit::Degree => {
                Dimension::Angle
            }
            Unit::Millisecond | Unit::Second | Unit::Minute | Unit::Hour => Dimension::Time,
            Unit::Celsius => Dimension::Temperature,
            Unit::Dimensionless => Dimension::Dimensionless,
        }
    }

    /// Factor to the dimension's base unit (nm, mW, %, Hz, mrad, s, °C, 1).
    fn scale(self) -> f64 {
        match self {
            Unit::Picometer => 1e-3,
            Unit::Nanometer => 1.0,
            Unit::Micrometer => 1e3,
            Unit::Millimeter => 1e6,
            Unit::Centimeter => 1e7,
            Unit::Meter => 1e9,
            Unit::Microwatt => 1e-3,
            Unit::Milliwatt => 1.0,
            Unit::Watt => 1e3,
            Unit::Percent => 1.0,
            Unit::Hertz => 1.0,
            Unit::Kilohertz => 1e3,
            Unit::Megahertz => 1e6,
            Unit::Gigahertz => 1e9,
            Unit::Microradian => 1e-3,
            Unit::Milliradian => 1.0,
            Unit::Radian => 1e3,
            Unit::Degree => 17.453_292_519_943_3,
            Unit::Millisecond => 1e-3,
            Unit::Second => 1.0,
            Unit::Minute => 60.0,
            Unit::Hour => 3600.0,
            Unit::Celsius => 1.0,
            Unit::Dimensionless => 1.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Picometer => "pm",
            Unit::Nanometer => "nm",
            Unit::Micrometer => "µm",
            Unit::Millimeter => "mm",
            Unit::Centimeter => "cm",
            Unit::Meter => "m",
            Unit::Microwatt => "µW",
            Unit::Milliwatt => "mW",
            Unit::Watt => "W",
            Unit::Percent => "%",
            Unit::Hertz => "Hz",
            Unit::Kilohertz => "kHz",
            Unit::Megahertz => "MHz",
            Unit::Gigahertz => "GHz",
            Unit::Microradian => "µrad",
            Unit::Milliradian => "mrad",
            Unit::Radian => "rad",
            Unit::Degree => "°",
            Unit::Millisecond => "ms",
            Unit::Second => "s",
            Unit::Minute => "min",
            Unit::Hour => "h",
            Unit::Celsius => "°C",
            Unit::Dimensionless => "",
        }
    }

    /// Recognize a unit token as it appears in vendor documents.
    ///
    /// Case is folded except where it disambiguates SI prefixes that vendors
    /// actually use (`mW` vs `MW` is not one of them; nobody ships megawatt lasers).
    pub fn parse(token: &str) -> Option<Unit> {
        let t = token.trim().trim_end_matches('.').trim();
        if t.is_empty() {
            return None;
        }
        let lower = t.to_lowercase().replace('μ', "µ");
        let unit = match lower.as_str() {
            "pm" => Unit::Picometer,
            "nm" => Unit::Nanometer,
            "µm" | "um" | "micron" | "microns" => Unit::Micrometer,
            "mm" => Unit::Millimeter,
            "cm" => Unit::Centimeter,
            "m" => Unit::Meter,
            "µw" | "uw" => Unit::Microwatt,
            "mw" => Unit::Milliwatt,
            "w" => Unit::Watt,
            "%" | "% rms" | "%rms" | "percent" => Unit::Percent,
            "hz" => Unit::Hertz,
            "khz" => Unit::Kilohertz,
            "mhz" => Unit::Megahertz,
            "ghz" => Unit::Gigahertz,
            "µrad" | "urad" => Unit::Microradian,
            "mrad" => Unit::Milliradian,
            "rad" => Unit::Radian,
            "°" | "deg" | "degree" | "degrees" => Unit::Degree,
            "ms" => Unit::Millisecond,
            "s" | "sec" | "secs" | "second" | "seconds" => Unit::Second,
            "min" | "mins" | "minute" | "minutes" => Unit::Minute,
            "h" | "hr" | "hrs" | "hour" | "hours" => Unit::Hour,
            "°c" | "℃" | "deg c" | "degc" => Unit::Celsius,
            _ => return None,
        };
        Some(unit)
    }

    /// Convert `value` expressed in `self` into `target`.
    ///
    /// Returns `None` when the dimensions differ.
    pub fn convert(self, value: f64, target: Unit) -> Option<f64> {
        if self == target {
            return Some(value);
        }
        if self.dimension() != target.dimension() {
            return None;
        }
        Some(value * self.scale() / target.scale())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// Field domains
// ============================================================================

/// How a bounded-string field's text is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextForm {
    /// Trimmed, whitespace-collapsed text.
    Free,
    /// An atomic `N:M` ratio, stored without any comparator prefix.
    Ratio,
    /// Comma-separated, upper-cased token list (`USB, RS-232`).
    TokenList,
    /// `X x Y x Z` box dimensions.
    Dimensions,
}

/// Declared value domain of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDomain {
    Numeric {
        unit: Unit,
    },
    Boolean {
        /// Field-specific words that also read as `true`.
        #[serde(skip)]
        truthy: &'static [&'static str],
    },
    Text {
        max_len: usize,
        form: TextForm,
    },
}

impl FieldDomain {
    /// JSON-schema style type name used in the fallback contract.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldDomain::Numeric { .. } => "number",
            FieldDomain::Boolean { .. } => "boolean",
            FieldDomain::Text { .. } => "string",
        }
    }

    pub fn expected_unit(&self) -> Option<Unit> {
        match self {
            FieldDomain::Numeric { unit } => Some(*unit),
            _ => None,
        }
    }
}

/// Static description of one canonical field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub field: CanonicalField,
    pub domain: FieldDomain,
    /// A field of the same quantity in a different dimension; a value whose
    /// unit disagrees with `domain` but matches the sibling is routed there.
    pub sibling: Option<CanonicalField>,
}

// ============================================================================
// Canonical fields
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    WavelengthNm,
    OutputPowerMwNominal,
    OutputPowerMwMin,
    RmsNoisePct,
    PowerStabilityPct,
    LinewidthMhz,
    LinewidthNm,
    M2,
    BeamDiameterMm,
    BeamDivergenceMrad,
    Polarization,
    PolarizationRatio,
    ModulationAnalogHz,
    ModulationDigitalHz,
    TtlShutter,
    FiberOutput,
    FiberNa,
    FiberMfdUm,
    WarmupTimeMin,
    Interfaces,
    DimensionsMm,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 21] = [
        CanonicalField::WavelengthNm,
        CanonicalField::OutputPowerMwNominal,
        CanonicalField::OutputPowerMwMin,
        CanonicalField::RmsNoisePct,
        CanonicalField::PowerStabilityPct,
        CanonicalField::LinewidthMhz,
        CanonicalField::LinewidthNm,
        CanonicalField::M2,
        CanonicalField::BeamDiameterMm,
        CanonicalField::BeamDivergenceMrad,
        CanonicalField::Polarization,
        CanonicalField::PolarizationRatio,
        CanonicalField::ModulationAnalogHz,
        CanonicalField::ModulationDigitalHz,
        CanonicalField::TtlShutter,
        CanonicalField::FiberOutput,
        CanonicalField::FiberNa,
        CanonicalField::FiberMfdUm,
        CanonicalField::WarmupTimeMin,
        CanonicalField::Interfaces,
        CanonicalField::DimensionsMm,
    ];

    pub fn id(self) -> &'static str {
        match self {
            CanonicalField::WavelengthNm => "wavelength_nm",
            CanonicalField::OutputPowerMwNominal => "output_power_mw_nominal",
            CanonicalField::OutputPowerMwMin => "output_power_mw_min",
            CanonicalField::RmsNoisePct => "rms_noise_pct",
            CanonicalField::PowerStabilityPct => "power_stability_pct",
            CanonicalField::LinewidthMhz => "linewidth_mhz",
            CanonicalField::LinewidthNm => "linewidth_nm",
            CanonicalField::M2 => "m2",
            CanonicalField::BeamDiameterMm => "beam_diameter_mm",
            CanonicalField::BeamDivergenceMrad => "beam_divergence_mrad",
            CanonicalField::Polarization => "polarization",
            CanonicalField::PolarizationRatio => "polarization_ratio",
            CanonicalField::ModulationAnalogHz => "modulation_analog_hz",
            CanonicalField::ModulationDigitalHz => "modulation_digital_hz",
            CanonicalField::TtlShutter => "ttl_shutter",
            CanonicalField::FiberOutput => "fiber_output",
            CanonicalField::FiberNa => "fiber_na",
            CanonicalField::FiberMfdUm => "fiber_mfd_um",
            CanonicalField::WarmupTimeMin => "warmup_time_min",
            CanonicalField::Interfaces => "interfaces",
            CanonicalField::DimensionsMm => "dimensions_mm",
        }
    }

    pub fn descriptor(self) -> FieldDescriptor {
        use CanonicalField as F;

        let numeric = |unit| FieldDomain::Numeric { unit };
        let (domain, sibling) = match self {
            F::WavelengthNm => (numeric(Unit::Nanometer), None),
            F::OutputPowerMwNominal | F::OutputPowerMwMin => (numeric(Unit::Milliwatt), None),
            F::RmsNoisePct | F::PowerStabilityPct => (numeric(Unit::Percent), None),
            F::LinewidthMhz => (numeric(Unit::Megahertz), Some(F::LinewidthNm)),
            F::LinewidthNm => (numeric(Unit::Nanometer), Some(F::LinewidthMhz)),
            F::M2 | F::FiberNa => (numeric(Unit::Dimensionless), None),
            F::BeamDiameterMm => (numeric(Unit::Millimeter), None),
            F::BeamDivergenceMrad => (numeric(Unit::Milliradian), None),
            F::ModulationAnalogHz | F::ModulationDigitalHz => (numeric(Unit::Hertz), None),
            F::FiberMfdUm => (numeric(Unit::Micrometer), None),
            F::WarmupTimeMin => (numeric(Unit::Minute), None),
            F::TtlShutter => (
                FieldDomain::Boolean {
                    truthy: &["shutter"],
                },
                None,
            ),
            F::FiberOutput => (
                FieldDomain::Boolean {
                    truthy: &["smf", "mmf", "pm fiber", "fiber", "integrated fiber"],
                },
                None,
            ),
            F::Polarization => (
                FieldDomain::Text {
                    max_len: 64,
                    form: TextForm::Free,
                },
                None,
            ),
            F::PolarizationRatio => (
                FieldDomain::Text {
                    max_len: 32,
                    form: TextForm::Ratio,
                },
                None,
            ),
            F::Interfaces => (
                FieldDomain::Text {
                    max_len: 128,
                    form: TextForm::TokenList,
                },
                None,
            ),
            F::DimensionsMm => (
                FieldDomain::Text {
                    max_len: 64,
                    form: TextForm::Dimensions,
                },
                None,
            ),
        };

        FieldDescriptor {
            field: self,
            domain,
            sibling,
        }
    }

    pub fn domain(self) -> FieldDomain {
        self.descriptor().domain
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown canonical field id: {0:?}")]
pub struct UnknownFieldError(pub String);

impl FromStr for CanonicalField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|f| f.id() == s.trim())
            .ok_or_else(|| UnknownFieldError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ids_round_trip_through_from_str() {
        for field in CanonicalField::ALL {
            assert_eq!(field.id().parse::<CanonicalField>().unwrap(), field);
        }
        assert!("laser_color".parse::<CanonicalField>().is_err());
    }

    #[test]
    fn serde_id_matches_id() {
        for field in CanonicalField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.id()));
        }
    }

    #[test]
    fn conversion_stays_within_dimension() {
        assert_relative_eq!(Unit::Watt.convert(1.5, Unit::Milliwatt).unwrap(), 1500.0);
        assert_relative_eq!(
            Unit::Megahertz.convert(2.0, Unit::Hertz).unwrap(),
            2_000_000.0
        );
        assert_relative_eq!(Unit::Second.convert(90.0, Unit::Minute).unwrap(), 1.5);
        assert!(Unit::Nanometer.convert(488.0, Unit::Milliwatt).is_none());
    }

    #[test]
    fn unit_tokens_are_recognized() {
        assert_eq!(Unit::parse("nm"), Some(Unit::Nanometer));
        assert_eq!(Unit::parse("mW"), Some(Unit::Milliwatt));
        assert_eq!(Unit::parse("μm"), Some(Unit::Micrometer));
        assert_eq!(Unit::parse("°C"), Some(Unit::Celsius));
        assert_eq!(Unit::parse("min."), Some(Unit::Minute));
        assert_eq!(Unit::parse("parsec"), None);
    }

    #[test]
    fn linewidth_fields_are_siblings() {
        assert_eq!(
            CanonicalField::LinewidthMhz.descriptor().sibling,
            Some(CanonicalField::LinewidthNm)
        );
        assert_eq!(
            CanonicalField::LinewidthMhz.domain().expected_unit(),
            Some(Unit::Megahertz)
        );
    }
}
