// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline mode tag

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two sequential pipelines a workflow is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Hardening,
    Enhance,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Hardening => "hardening",
            Mode::Enhance => "enhance",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "hardening" => Ok(Mode::Hardening),
            "enhance" => Ok(Mode::Enhance),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["hardening", "enhance"],
            )),
        }
    }
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
