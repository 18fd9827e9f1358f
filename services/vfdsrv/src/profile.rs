//! Drive family profiles: register maps, scalar calculation expressions
//! and status decoding rules.
//!
//! A profile is pure data. The behavioural variants between families
//! (signed output frequency, dual status registers, integer-only status)
//! are predicates over profile fields, never subtypes.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Which Modbus read function serves a family's telemetry registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterSpace {
    #[default]
    Holding,
    Input,
}

/// Register settings for one drive family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveProfile {
    #[serde(rename = "RegisterSpace", default)]
    pub register_space: RegisterSpace,
    /// One or two writable registers receiving the commanded frequency;
    /// the second takes the same value scaled by the preset multiplier
    #[serde(rename = "Setpoint")]
    pub setpoint: Vec<u16>,
    #[serde(rename = "Control")]
    pub control: u16,
    #[serde(rename = "SpeedPresetMultiplier", default)]
    pub speed_preset_multiplier: u16,
    #[serde(rename = "OutputFrequency")]
    pub output_frequency: u16,
    #[serde(rename = "OutputCurrent")]
    pub output_current: u16,
    #[serde(rename = "Status")]
    pub status: u16,
    /// Bit positions for the abstract states; empty means the status word
    /// is an integer fault code
    #[serde(rename = "StatusBits", default)]
    pub status_bits: HashMap<String, u8>,
    #[serde(rename = "StartValue")]
    pub start_value: u16,
    #[serde(rename = "StopValue")]
    pub stop_value: u16,
    #[serde(rename = "UnTripRegister", default)]
    pub untrip_register: u16,
    #[serde(rename = "UnTripValue", default)]
    pub untrip_value: u16,
    #[serde(rename = "OutFreqCalc", default)]
    pub out_freq_calc: String,
    #[serde(rename = "SetFreqCalc", default)]
    pub set_freq_calc: String,
    #[serde(rename = "OutCurrentCalc", default)]
    pub out_current_calc: String,
    #[serde(rename = "SignedOutputFreq", default)]
    pub signed_output_freq: bool,
    #[serde(rename = "MinHz", default)]
    pub min_hz: u16,
    /// Secondary status word; > 0 selects the two-register convention
    /// (bit 0 here = enabled, bit 3 of Status = inhibited)
    #[serde(rename = "EnabledStatus", default)]
    pub enabled_status: u16,
}

/// Status bit names used in profile documents
pub const BIT_ENABLED: &str = "Enabled";
pub const BIT_TRIPPED: &str = "Tripped";
pub const BIT_INHIBITED: &str = "Inhibited";

/// Abstract drive state, decoded from profile rules or assigned by the
/// polling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveStatus {
    /// No poll has completed yet
    Waiting,
    Running,
    Stopped,
    Tripped,
    NotReady,
    Inhibited,
    Unknown,
    /// No healthy session
    Unavailable,
    /// Administratively off
    Disabled,
}

impl fmt::Display for DriveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriveStatus::Waiting => "Waiting",
            DriveStatus::Running => "Running",
            DriveStatus::Stopped => "Stopped",
            DriveStatus::Tripped => "Tripped",
            DriveStatus::NotReady => "NotReady",
            DriveStatus::Inhibited => "Inhibited",
            DriveStatus::Unknown => "Unknown",
            DriveStatus::Unavailable => "Unavailable",
            DriveStatus::Disabled => "Disabled",
        };
        f.write_str(name)
    }
}

/// Read-only catalogue keyed by family name
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: HashMap<String, DriveProfile>,
}

impl ProfileCatalog {
    pub fn new(profiles: HashMap<String, DriveProfile>) -> Self {
        Self { profiles }
    }

    pub fn get(&self, family: &str) -> Option<&DriveProfile> {
        self.profiles.get(family)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Load the profile catalogue; failure here is fatal at startup
pub fn load_catalog(path: impl AsRef<Path>) -> Result<ProfileCatalog> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!(
            "failed to read drive profiles {}: {e}",
            path.display()
        ))
    })?;
    let profiles: HashMap<String, DriveProfile> = serde_json::from_str(&data).map_err(|e| {
        GatewayError::Config(format!(
            "failed to parse drive profiles {}: {e}",
            path.display()
        ))
    })?;
    for (family, profile) in &profiles {
        if profile.setpoint.is_empty() {
            return Err(GatewayError::Config(format!(
                "drive profile {family} declares no setpoint register"
            )));
        }
    }
    Ok(ProfileCatalog::new(profiles))
}

/// Apply a scalar calculation expression to a raw register word.
///
/// The grammar covers every scaling the supported families use: an empty
/// expression divides by ten, `* A` and `/ A` apply one factor, and
/// `* A / B` / `/ A * B` apply two in the written order. Anything else
/// leaves the raw value untouched.
pub fn apply_calc(raw: f64, expr: &str) -> f64 {
    let expr = expr.trim();
    if expr.is_empty() {
        return raw / 10.0;
    }

    let tokens = tokenize(expr);
    match tokens.as_slice() {
        [Token::Mul, Token::Num(a)] => raw * a,
        [Token::Div, Token::Num(a)] => raw / a,
        [Token::Mul, Token::Num(a), Token::Div, Token::Num(b)] => raw * a / b,
        [Token::Div, Token::Num(a), Token::Mul, Token::Num(b)] => raw / a * b,
        _ => raw,
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Mul,
    Div,
    Num(f64),
}

fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut number = String::new();
    for ch in expr.chars() {
        match ch {
            '*' | '/' => {
                if !number.is_empty() {
                    match number.parse() {
                        Ok(n) => tokens.push(Token::Num(n)),
                        Err(_) => return Vec::new(),
                    }
                    number.clear();
                }
                tokens.push(if ch == '*' { Token::Mul } else { Token::Div });
            }
            c if c.is_whitespace() => {
                if !number.is_empty() {
                    match number.parse() {
                        Ok(n) => tokens.push(Token::Num(n)),
                        Err(_) => return Vec::new(),
                    }
                    number.clear();
                }
            }
            c => number.push(c),
        }
    }
    if !number.is_empty() {
        match number.parse() {
            Ok(n) => tokens.push(Token::Num(n)),
            Err(_) => return Vec::new(),
        }
    }
    tokens
}

/// Decode the abstract drive state from the raw status word(s).
///
/// Order matters for the bit-based families: a tripped drive often also
/// reads as inhibited, and the trip must win.
pub fn decode_status(status: u16, enabled_status: u16, profile: &DriveProfile) -> DriveStatus {
    // Integer-based status: zero is healthy, anything else is a fault code.
    if profile.status_bits.is_empty() {
        return if status == 0 {
            DriveStatus::Running
        } else {
            DriveStatus::Inhibited
        };
    }

    // Two-register convention (GS-style drives).
    if profile.enabled_status > 0 {
        if status & (1 << 3) != 0 {
            return DriveStatus::NotReady;
        }
        return if enabled_status & 1 != 0 {
            DriveStatus::Running
        } else {
            DriveStatus::Stopped
        };
    }

    let bit_set = |name: &str| {
        profile
            .status_bits
            .get(name)
            .map(|bit| status & (1 << bit) != 0)
            .unwrap_or(false)
    };

    if bit_set(BIT_TRIPPED) {
        DriveStatus::Tripped
    } else if bit_set(BIT_INHIBITED) {
        DriveStatus::NotReady
    } else if bit_set(BIT_ENABLED) {
        DriveStatus::Running
    } else {
        DriveStatus::Stopped
    }
}

/// Minimal profile for tests across the crate
#[cfg(test)]
pub(crate) fn profile_with_bits(bits: &[(&str, u8)]) -> DriveProfile {
    DriveProfile {
        register_space: RegisterSpace::Holding,
        setpoint: vec![1],
        control: 0,
        speed_preset_multiplier: 0,
        output_frequency: 2,
        output_current: 3,
        status: 4,
        status_bits: bits
            .iter()
            .map(|(name, bit)| (name.to_string(), *bit))
            .collect(),
        start_value: 1,
        stop_value: 0,
        untrip_register: 0,
        untrip_value: 0,
        out_freq_calc: String::new(),
        set_freq_calc: String::new(),
        out_current_calc: String::new(),
        signed_output_freq: false,
        min_hz: 0,
        enabled_status: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== apply_calc ==========

    #[test]
    fn empty_expression_divides_by_ten() {
        assert_eq!(apply_calc(450.0, ""), 45.0);
        assert_eq!(apply_calc(450.0, "   "), 45.0);
    }

    #[test]
    fn multiply_expression() {
        assert_eq!(apply_calc(450.0, "* 10"), 4500.0);
        assert_eq!(apply_calc(450.0, "*10"), 4500.0);
    }

    #[test]
    fn divide_expression() {
        assert_eq!(apply_calc(4500.0, "/ 100"), 45.0);
    }

    #[test]
    fn multiply_then_divide() {
        assert_eq!(apply_calc(120.0, "* 3 / 2"), 180.0);
    }

    #[test]
    fn divide_then_multiply() {
        // The scaling used by drives that express frequency as a fraction
        // of a fixed-point constant.
        let result = apply_calc(4500.0, "/ 60 * 8192");
        assert!((result - 614_400.0).abs() < 1e-6);
    }

    #[test]
    fn unparseable_expression_returns_raw() {
        assert_eq!(apply_calc(450.0, "+ 10"), 450.0);
        assert_eq!(apply_calc(450.0, "* ten"), 450.0);
        assert_eq!(apply_calc(450.0, "* 10 / "), 450.0);
    }

    #[test]
    fn multiply_divide_inverse_law() {
        for raw in [0.0, 1.0, 37.5, 4500.0] {
            let there = apply_calc(raw, "* 7.5");
            let back = apply_calc(there, "/ 7.5");
            assert!((back - raw).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_is_fixed_point_of_every_form() {
        for expr in ["", "* 10", "/ 100", "* 3 / 2", "/ 60 * 8192"] {
            assert_eq!(apply_calc(0.0, expr), 0.0);
        }
    }

    // ========== decode_status ==========

    #[test]
    fn integer_status_running_and_inhibited() {
        let profile = profile_with_bits(&[]);
        assert_eq!(decode_status(0, 0, &profile), DriveStatus::Running);
        for code in [1u16, 2, 17, 0xFFFF] {
            assert_eq!(decode_status(code, 0, &profile), DriveStatus::Inhibited);
        }
    }

    #[test]
    fn bit_status_trip_wins_over_inhibit() {
        let profile = profile_with_bits(&[("Enabled", 0), ("Tripped", 1), ("Inhibited", 3)]);
        // Tripped and inhibited bits both set.
        assert_eq!(decode_status(0b1010, 0, &profile), DriveStatus::Tripped);
        assert_eq!(decode_status(0b1000, 0, &profile), DriveStatus::NotReady);
        assert_eq!(decode_status(0b0001, 0, &profile), DriveStatus::Running);
        assert_eq!(decode_status(0b0000, 0, &profile), DriveStatus::Stopped);
    }

    #[test]
    fn two_register_status_convention() {
        let mut profile = profile_with_bits(&[("Enabled", 0), ("Inhibited", 3)]);
        profile.enabled_status = 8449;

        assert_eq!(decode_status(0, 1, &profile), DriveStatus::Running);
        assert_eq!(decode_status(0, 0, &profile), DriveStatus::Stopped);
        // Inhibited bit in the primary word overrides the enabled word.
        assert_eq!(decode_status(8, 1, &profile), DriveStatus::NotReady);
    }

    // ========== catalogue parsing ==========

    #[test]
    fn profile_defaults_and_unknown_fields() {
        let json = r#"{
            "Setpoint": [1],
            "Control": 0,
            "OutputFrequency": 2,
            "OutputCurrent": 3,
            "Status": 4,
            "StartValue": 1,
            "StopValue": 0,
            "SomeFutureField": 99
        }"#;

        let profile: DriveProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.register_space, RegisterSpace::Holding);
        assert!(profile.status_bits.is_empty());
        assert!(!profile.signed_output_freq);
        assert_eq!(profile.enabled_status, 0);
        assert_eq!(profile.out_freq_calc, "");
    }

    #[test]
    fn register_space_parses_lowercase() {
        let json = r#"{
            "RegisterSpace": "input",
            "Setpoint": [1],
            "Control": 0,
            "OutputFrequency": 2,
            "OutputCurrent": 3,
            "Status": 4,
            "StartValue": 1,
            "StopValue": 0
        }"#;
        let profile: DriveProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.register_space, RegisterSpace::Input);
    }
}
