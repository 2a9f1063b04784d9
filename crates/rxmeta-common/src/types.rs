//! Identifier types and terminology enums shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An RxNorm concept unique identifier (RxCUI).
///
/// RxCUIs are numeric identifiers assigned by the NLM. They are never reused,
/// so retired and remapped identifiers remain valid keys into the historical
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RxCui(pub u32);

impl RxCui {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RxCui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RxCui {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(RxCui)
    }
}

impl From<u32> for RxCui {
    fn from(v: u32) -> Self {
        RxCui(v)
    }
}

/// A National Drug Code identifying a packaged product.
///
/// Stored in the normalized 11-digit form with leading zeros preserved, which
/// is why this is a string wrapper rather than a number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ndc(pub String);

impl Ndc {
    pub fn new(code: impl Into<String>) -> Self {
        Ndc(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An NDC in the normalized form used throughout the metadata is exactly
    /// 11 digits.
    pub fn is_normalized(&self) -> bool {
        self.0.len() == 11 && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for Ndc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RxNorm term type (TTY) of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tty {
    /// Single ingredient
    In,
    /// Multiple ingredient
    Min,
    /// Precise ingredient
    Pin,
    /// Semantic clinical drug (generic orderable)
    Scd,
    /// Semantic branded drug
    Sbd,
    /// Generic pack
    Gpck,
    /// Branded pack
    Bpck,
    /// Any other term type; carried but not placed in the drug hierarchy
    Other,
}

impl Tty {
    pub fn parse(s: &str) -> Self {
        match s {
            "IN" => Tty::In,
            "MIN" => Tty::Min,
            "PIN" => Tty::Pin,
            "SCD" => Tty::Scd,
            "SBD" => Tty::Sbd,
            "GPCK" => Tty::Gpck,
            "BPCK" => Tty::Bpck,
            _ => Tty::Other,
        }
    }

    /// IN, MIN and PIN codes name ingredients.
    pub fn is_ingredient(self) -> bool {
        matches!(self, Tty::In | Tty::Min | Tty::Pin)
    }

    /// SCD, SBD, GPCK and BPCK codes name orderable drugs.
    pub fn is_drug(self) -> bool {
        matches!(self, Tty::Scd | Tty::Sbd | Tty::Gpck | Tty::Bpck)
    }

    /// Generic orderables (SCD/GPCK) anchor the drug level of the hierarchy;
    /// branded forms hang beneath them.
    pub fn is_generic_drug(self) -> bool {
        matches!(self, Tty::Scd | Tty::Gpck)
    }

    pub fn is_branded_drug(self) -> bool {
        matches!(self, Tty::Sbd | Tty::Bpck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tty::In => "IN",
            Tty::Min => "MIN",
            Tty::Pin => "PIN",
            Tty::Scd => "SCD",
            Tty::Sbd => "SBD",
            Tty::Gpck => "GPCK",
            Tty::Bpck => "BPCK",
            Tty::Other => "OTHER",
        }
    }
}

impl fmt::Display for Tty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an RxNorm concept as reported by the history API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConceptStatus {
    Active,
    /// Retired with a replacement identifier
    Remapped,
    Retired,
    NeverActive,
}

impl ConceptStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => ConceptStatus::Active,
            "REMAPPED" => ConceptStatus::Remapped,
            "NEVER ACTIVE" | "NEVER_ACTIVE" => ConceptStatus::NeverActive,
            _ => ConceptStatus::Retired,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ConceptStatus::Active)
    }
}
