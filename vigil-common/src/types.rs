//! Core domain model for Vigil
//!
//! Defines the per-zone assessment and finding types produced by the
//! analyzers, and the fused `SituationSnapshot` published by the
//! orchestrator. All types are immutable after creation; a new analysis
//! run produces a fresh snapshot rather than mutating the old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Crowd density scale as reported by the vision model
///
/// `Unknown` is the sentinel for zones where no frames were available or
/// the model output could not be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdDensity {
    Unknown,
    Low,
    Moderate,
    High,
    Critical,
}

impl CrowdDensity {
    /// Ordinal severity level (0 = low .. 3 = critical)
    ///
    /// Unknown maps to the moderate level: absence of evidence is not
    /// treated as evidence of calm.
    pub fn level(&self) -> u8 {
        match self {
            CrowdDensity::Low => 0,
            CrowdDensity::Moderate | CrowdDensity::Unknown => 1,
            CrowdDensity::High => 2,
            CrowdDensity::Critical => 3,
        }
    }

    /// Tolerant parse of model output; anything unrecognized is Unknown
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => CrowdDensity::Low,
            "moderate" | "medium" => CrowdDensity::Moderate,
            "high" => CrowdDensity::High,
            "critical" => CrowdDensity::Critical,
            _ => CrowdDensity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdDensity::Unknown => "unknown",
            CrowdDensity::Low => "low",
            CrowdDensity::Moderate => "moderate",
            CrowdDensity::High => "high",
            CrowdDensity::Critical => "critical",
        }
    }
}

/// Observed crowd behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdBehavior {
    Unknown,
    Calm,
    Excited,
    Restless,
    Agitated,
}

impl CrowdBehavior {
    /// Ordinal severity level (0 = calm .. 3 = agitated)
    pub fn level(&self) -> u8 {
        match self {
            CrowdBehavior::Calm => 0,
            CrowdBehavior::Excited | CrowdBehavior::Unknown => 1,
            CrowdBehavior::Restless => 2,
            CrowdBehavior::Agitated => 3,
        }
    }

    /// Tolerant parse of model output; anything unrecognized is Unknown
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "calm" => CrowdBehavior::Calm,
            "excited" => CrowdBehavior::Excited,
            "restless" => CrowdBehavior::Restless,
            "agitated" => CrowdBehavior::Agitated,
            _ => CrowdBehavior::Unknown,
        }
    }

    /// Whether this behavior reads as benign on its own
    pub fn is_benign(&self) -> bool {
        matches!(self, CrowdBehavior::Calm | CrowdBehavior::Excited)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdBehavior::Unknown => "unknown",
            CrowdBehavior::Calm => "calm",
            CrowdBehavior::Excited => "excited",
            CrowdBehavior::Restless => "restless",
            CrowdBehavior::Agitated => "agitated",
        }
    }
}

/// Fixed ordinal threat scale
///
/// Derive order matters: `Ord` follows declaration order, so
/// `Low < Moderate < High < Critical` holds structurally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl ThreatLevel {
    /// Clamping conversion from an ordinal severity level
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => ThreatLevel::Low,
            1 => ThreatLevel::Moderate,
            2 => ThreatLevel::High,
            _ => ThreatLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Moderate => "moderate",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

/// Per-zone assessment produced by the vision analyzer
///
/// Created once per analysis run per zone; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAssessment {
    /// Zone identifier (e.g., "Zone A")
    pub zone_id: String,
    /// Crowd density observed across the sampled frames
    pub crowd_density: CrowdDensity,
    /// Predominant crowd behavior
    pub behavior: CrowdBehavior,
    /// Identified risks, in the order the model reported them
    pub risks: Vec<String>,
    /// Observations about barriers, exits, facilities
    pub infrastructure_notes: Vec<String>,
    /// Analyzer confidence in this assessment (0.0-1.0)
    pub confidence: f32,
    /// When the assessment was produced
    pub timestamp: DateTime<Utc>,
}

impl ZoneAssessment {
    /// Sentinel assessment for a zone with no usable frames
    ///
    /// Fusion still proceeds with this entry; the explicit Unknown
    /// density and low confidence mark it as weak evidence.
    pub fn empty_input(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            crowd_density: CrowdDensity::Unknown,
            behavior: CrowdBehavior::Unknown,
            risks: Vec::new(),
            infrastructure_notes: Vec::new(),
            confidence: 0.1,
            timestamp: Utc::now(),
        }
    }
}

/// Structured finding extracted from one field report document
///
/// `zone_id == None` marks an event-wide finding not tied to a single
/// zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFinding {
    /// Zone this finding applies to, or None for event-wide findings
    pub zone_id: Option<String>,
    /// Summary of the report content for this zone
    pub summary: String,
    /// Priority issues flagged in the report
    pub priority_issues: Vec<String>,
    /// Resource name -> status description (e.g., "medical_teams" -> "2 of 3 deployed")
    pub resource_status: BTreeMap<String, String>,
    /// Analyzer confidence in this finding (0.0-1.0)
    pub confidence: f32,
    /// When the finding was produced
    pub timestamp: DateTime<Utc>,
}

/// Merged per-zone view inside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneView {
    /// Vision assessment, if the zone had video coverage this run
    pub assessment: Option<ZoneAssessment>,
    /// Report finding, if a field report mentioned this zone
    pub finding: Option<ReportFinding>,
    /// Qualitative disagreements between the two modalities
    pub discrepancies: Vec<String>,
    /// Actions for this zone, highest priority first
    pub recommended_actions: Vec<String>,
    /// Threat level derived for this zone
    pub threat_level: ThreatLevel,
}

/// The single fused situational summary across all zones
///
/// Exactly one snapshot is "current" at a time; the orchestrator swaps
/// it atomically and readers only ever see a fully formed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationSnapshot {
    /// When this snapshot was generated
    pub generated_at: DateTime<Utc>,
    /// Maximum zone-level threat across all zones
    pub overall_threat_level: ThreatLevel,
    /// Merged view per zone, keyed by zone id
    pub zones: BTreeMap<String, ZoneView>,
    /// Zones whose analysis failed this run, with the failure reason
    pub degraded_zones: BTreeMap<String, String>,
    /// Overall confidence in the snapshot (0.0-1.0)
    pub confidence: f32,
}

impl SituationSnapshot {
    /// Zone ids present in this snapshot
    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }
}

/// Answer from the query engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// Natural-language answer text
    pub answer_text: String,
    /// Confidence in the answer (0.0-1.0)
    pub confidence: f32,
    /// Zones in the current snapshot this answer draws on
    pub supporting_zones: Vec<String>,
    /// False when no snapshot has been published yet
    pub grounded: bool,
}

impl QueryAnswer {
    /// Fixed response when no snapshot has ever been published
    pub fn not_initialized() -> Self {
        Self {
            answer_text:
                "No situational analysis has completed yet. Start an analysis run first."
                    .to_string(),
            confidence: 0.0,
            supporting_zones: Vec::new(),
            grounded: false,
        }
    }
}

/// Clamp a model-reported confidence into [0,1], defaulting junk to 0.5
pub fn clamp_confidence(value: Option<f32>) -> f32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_level_ordering() {
        assert!(ThreatLevel::Low < ThreatLevel::Moderate);
        assert!(ThreatLevel::Moderate < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn test_density_parse_loose_falls_back_to_unknown() {
        assert_eq!(CrowdDensity::parse_loose("HIGH"), CrowdDensity::High);
        assert_eq!(CrowdDensity::parse_loose("  moderate "), CrowdDensity::Moderate);
        assert_eq!(CrowdDensity::parse_loose("packed"), CrowdDensity::Unknown);
    }

    #[test]
    fn test_unknown_density_is_not_treated_as_low() {
        assert_eq!(CrowdDensity::Unknown.level(), CrowdDensity::Moderate.level());
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(Some(1.5)), 1.0);
        assert_eq!(clamp_confidence(Some(-0.2)), 0.0);
        assert_eq!(clamp_confidence(Some(f32::NAN)), 0.5);
        assert_eq!(clamp_confidence(None), 0.5);
    }

    #[test]
    fn test_empty_input_sentinel() {
        let a = ZoneAssessment::empty_input("Zone A");
        assert_eq!(a.crowd_density, CrowdDensity::Unknown);
        assert!(a.confidence < 0.2, "empty input must be marked low confidence");
    }
}
