//! Status query decoding.
//!
//! A status query answers with one `Key:Value` pair per line:
//!
//! ```text
//! Func:cv(on)
//! voltage:3300
//! current:500
//! V_in:12.10V
//! V_out:3.29V
//! I_out:0.120A
//! ```
//!
//! `Func` is the only required key. Its presence is what distinguishes a
//! device answer from a failed call, so a missing `Func` is reported as
//! [`ParseError::MissingMode`] and never papered over with defaults.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

const FUNC_KEY: &str = "Func";
const VOLTAGE_KEY: &str = "voltage";
const CURRENT_KEY: &str = "current";
const V_IN_KEY: &str = "V_in";
const V_OUT_KEY: &str = "V_out";
const I_OUT_KEY: &str = "I_out";

/// Errors produced while decoding a status answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `Func` entry; the device did not answer (or answered garbage).
    #[error("no mode marker in device response")]
    MissingMode,

    /// A numeric field held something other than a base-10 unsigned integer.
    #[error("malformed value '{value}' for field '{key}'")]
    MalformedField { key: String, value: String },
}

/// Operating function reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Cv,
    Cl,
    Cc,
    Funcgen,
    Unknown,
}

impl Mode {
    /// Maps the bare mode token of a `Func` value. Case-sensitive.
    pub fn from_token(token: &str) -> Self {
        match token {
            "cv" => Mode::Cv,
            "cl" => Mode::Cl,
            "cc" => Mode::Cc,
            "funcgen" => Mode::Funcgen,
            _ => Mode::Unknown,
        }
    }

    /// Upper-case label used by displays.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Cv => "CV",
            Mode::Cl => "CL",
            Mode::Cc => "CC",
            Mode::Funcgen => "FUNCGEN",
            Mode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One decoded status answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub mode: Mode,
    pub power_on: bool,
    pub target_voltage_millivolts: u32,
    pub target_current_milliamps: u32,
    /// Device-formatted, unit suffixed. Passed through verbatim.
    pub input_voltage_text: String,
    pub output_voltage_text: String,
    pub output_current_text: String,
}

/// Decode the raw text of a status query.
///
/// Lines without a `:` are skipped (the device emits a few in some modes).
/// When a key repeats, the last occurrence wins. `voltage` and `current` are
/// optional and default to 0 when absent, but a present value that does not
/// parse is an error.
pub fn parse(raw: &str) -> Result<StatusRecord, ParseError> {
    let compact: String = raw.chars().filter(|c| *c != ' ').collect();
    let body = compact.trim_end_matches(['\r', '\n']);

    let mut fields: HashMap<&str, &str> = HashMap::new();
    for line in body.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key, value);
        }
    }

    let func = *fields.get(FUNC_KEY).ok_or(ParseError::MissingMode)?;

    // Loose on purpose: the protocol encodes the output state as "(on)"/"(off)".
    let power_on = func.contains("on");
    let token = func.split('(').next().unwrap_or_default();
    let mode = Mode::from_token(token);

    Ok(StatusRecord {
        mode,
        power_on,
        target_voltage_millivolts: milli_field(&fields, VOLTAGE_KEY)?,
        target_current_milliamps: milli_field(&fields, CURRENT_KEY)?,
        input_voltage_text: text_field(&fields, V_IN_KEY),
        output_voltage_text: text_field(&fields, V_OUT_KEY),
        output_current_text: text_field(&fields, I_OUT_KEY),
    })
}

fn milli_field(fields: &HashMap<&str, &str>, key: &str) -> Result<u32, ParseError> {
    match fields.get(key) {
        None => Ok(0),
        Some(value) => value.parse::<u32>().map_err(|_| ParseError::MalformedField {
            key: key.to_string(),
            value: (*value).to_string(),
        }),
    }
}

fn text_field(fields: &HashMap<&str, &str>, key: &str) -> String {
    fields.get(key).map(|v| (*v).to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CV_ON: &str = "Func:cv(on)\nvoltage:3000\ncurrent:1500\nV_in:12.1V\nV_out:3.00V\nI_out:0.450A";

    #[test]
    fn test_parse_cv_running() {
        let record = parse(CV_ON).unwrap();
        assert_eq!(record.mode, Mode::Cv);
        assert!(record.power_on);
        assert_eq!(record.target_voltage_millivolts, 3000);
        assert_eq!(record.target_current_milliamps, 1500);
        assert_eq!(record.input_voltage_text, "12.1V");
        assert_eq!(record.output_voltage_text, "3.00V");
        assert_eq!(record.output_current_text, "0.450A");
    }

    #[test]
    fn test_parse_empty_is_missing_mode() {
        assert_eq!(parse(""), Err(ParseError::MissingMode));
        assert_eq!(parse("\n"), Err(ParseError::MissingMode));
    }

    #[test]
    fn test_parse_without_func_never_returns_record() {
        let raw = "voltage:3000\ncurrent:1500\nV_in:12.1V";
        assert_eq!(parse(raw), Err(ParseError::MissingMode));
    }

    #[test]
    fn test_spaces_are_stripped() {
        let raw = "Func       : cl (off)\nvoltage    : 5000\nV_out      : 4.99 V\n";
        let record = parse(raw).unwrap();
        assert_eq!(record.mode, Mode::Cl);
        assert!(!record.power_on);
        assert_eq!(record.target_voltage_millivolts, 5000);
        assert_eq!(record.output_voltage_text, "4.99V");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let raw = "garbage line\nFunc:cc(off)\n---\ncurrent:200\r\n";
        let record = parse(raw).unwrap();
        assert_eq!(record.mode, Mode::Cc);
        assert_eq!(record.target_current_milliamps, 200);
    }

    #[test]
    fn test_func_variants_map_to_a_mode() {
        let cases = [
            ("Func:", Mode::Unknown, false),
            ("Func:(on)", Mode::Unknown, true),
            ("Func:cv", Mode::Cv, false),
            ("Func:cl(on", Mode::Cl, true),
            ("Func:cc(", Mode::Cc, false),
            ("Func:funcgen(on)", Mode::Funcgen, true),
            ("Func:cv(off)\r\nvoltage:100\r\n", Mode::Cv, false),
            ("voltage:100\r\nFunc:cl(on)\r\n", Mode::Cl, true),
            ("Func : c v ( o n )", Mode::Cv, true),
        ];

        for (raw, mode, power_on) in cases {
            let record = parse(raw).unwrap_or_else(|e| panic!("{:?} failed: {}", raw, e));
            assert_eq!(record.mode, mode, "mode of {:?}", raw);
            assert_eq!(record.power_on, power_on, "power of {:?}", raw);
        }

        let crlf = parse("Func:cv(off)\r\nvoltage:100\r\n").unwrap();
        assert_eq!(crlf.target_voltage_millivolts, 100);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let raw = "Func:cv(off)\nvoltage:1000\nvoltage:2000\nFunc:cl(on)";
        let record = parse(raw).unwrap();
        assert_eq!(record.mode, Mode::Cl);
        assert!(record.power_on);
        assert_eq!(record.target_voltage_millivolts, 2000);
    }

    #[test]
    fn test_value_keeps_text_after_first_colon() {
        let record = parse("Func:cv(on)\nV_in:12:34").unwrap();
        assert_eq!(record.input_voltage_text, "12:34");
    }

    #[test]
    fn test_unrecognized_mode_is_unknown() {
        assert_eq!(parse("Func:xx(off)").unwrap().mode, Mode::Unknown);
        assert_eq!(parse("Func:CV(on)").unwrap().mode, Mode::Unknown);
        assert_eq!(parse("Func:").unwrap().mode, Mode::Unknown);
    }

    #[test]
    fn test_funcgen_mode() {
        let record = parse("Func:funcgen(off)").unwrap();
        assert_eq!(record.mode, Mode::Funcgen);
        assert_eq!(record.target_voltage_millivolts, 0);
        assert_eq!(record.output_current_text, "");
    }

    #[test]
    fn test_power_detection_is_substring() {
        // "(off)" contains no "on"; a hypothetical "constant(off)" would.
        assert!(!parse("Func:cv(off)").unwrap().power_on);
        assert!(parse("Func:constant(off)").unwrap().power_on);
    }

    #[test]
    fn test_non_numeric_field_is_malformed() {
        let err = parse("Func:cv(on)\nvoltage:3.3V").unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedField {
                key: "voltage".into(),
                value: "3.3V".into()
            }
        );
        assert!(matches!(
            parse("Func:cv(on)\ncurrent:-5"),
            Err(ParseError::MalformedField { .. })
        ));
    }

    #[test]
    fn test_parse_is_deterministic() {
        assert_eq!(parse(CV_ON).unwrap(), parse(CV_ON).unwrap());
    }

    #[test]
    fn test_mode_serializes_upper_case() {
        let json = serde_json::to_string(&Mode::Funcgen).unwrap();
        assert_eq!(json, "\"FUNCGEN\"");
    }
}
