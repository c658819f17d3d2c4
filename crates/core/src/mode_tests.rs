// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_to_hardening() {
    assert_eq!(Mode::default(), Mode::Hardening);
}

#[parameterized(
    hardening = { Mode::Hardening, "hardening" },
    enhance = { Mode::Enhance, "enhance" },
)]
fn string_forms(mode: Mode, expected: &str) {
    assert_eq!(mode.as_str(), expected);
    assert_eq!(mode.to_string(), expected);
}

#[test]
fn serde_round_trips_both_variants() {
    for mode in [Mode::Hardening, Mode::Enhance] {
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, format!("\"{}\"", mode.as_str()));
        let back: Mode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mode);
    }
}

#[test]
fn unknown_variant_fails_to_deserialize() {
    let err = serde_json::from_str::<Mode>("\"harden\"").unwrap_err();
    assert!(err.to_string().contains("harden"));
    assert!(serde_json::from_str::<Mode>("\"\"").is_err());
    assert!(serde_json::from_str::<Mode>("3").is_err());
}
