//! Fusion engine
//!
//! Pure synchronous merge of the vision assessments and report findings
//! into one [`SituationSnapshot`]. Deterministic: the same inputs
//! always fuse to the same snapshot (timestamps aside), which keeps the
//! orchestrator's publish step trivially testable.

use std::collections::BTreeMap;
use vigil_common::types::{
    CrowdDensity, ReportFinding, SituationSnapshot, ThreatLevel, ZoneAssessment, ZoneView,
};

/// Confidence deduction per degraded zone
const DEGRADED_ZONE_PENALTY: f32 = 0.15;
/// Confidence deduction per cross-modality discrepancy
const DISCREPANCY_PENALTY: f32 = 0.08;
/// Confidence deduction per zone covered by only one modality
const SINGLE_MODALITY_PENALTY: f32 = 0.05;

/// Risk count at which a zone's threat is raised one level
const RISK_BUMP_THRESHOLD: usize = 3;

/// Pseudo-zone used when event-wide findings arrive with no zones at all
const EVENT_WIDE_ZONE: &str = "event";

pub struct SnapshotFuser;

impl SnapshotFuser {
    /// Fuse one run's analyzer outputs into a snapshot
    ///
    /// `degraded` maps zone id to failure reason for zones whose vision
    /// analysis failed this run; those zones appear in the snapshot's
    /// degraded set and count against overall confidence.
    pub fn fuse(
        assessments: Vec<ZoneAssessment>,
        findings: Vec<ReportFinding>,
        degraded: BTreeMap<String, String>,
    ) -> SituationSnapshot {
        let (zone_findings, event_findings) = split_findings(findings);

        let mut zone_ids: Vec<String> = assessments.iter().map(|a| a.zone_id.clone()).collect();
        for id in zone_findings.keys() {
            if !zone_ids.contains(id) {
                zone_ids.push(id.clone());
            }
        }
        zone_ids.sort();

        // Event-wide findings with no zones at all still need a home
        if zone_ids.is_empty() && !event_findings.is_empty() {
            zone_ids.push(EVENT_WIDE_ZONE.to_string());
        }

        let assessment_by_zone: BTreeMap<String, ZoneAssessment> = assessments
            .into_iter()
            .map(|a| (a.zone_id.clone(), a))
            .collect();

        let mut zones = BTreeMap::new();
        let mut discrepancy_count = 0usize;
        let mut single_modality_count = 0usize;

        for zone_id in &zone_ids {
            let assessment = assessment_by_zone.get(zone_id).cloned();
            let finding = zone_findings.get(zone_id).cloned();

            let discrepancies = detect_discrepancies(assessment.as_ref(), finding.as_ref());
            discrepancy_count += discrepancies.len();

            if assessment.is_some() != finding.is_some() {
                single_modality_count += 1;
            }

            let threat_level = zone_threat(assessment.as_ref(), finding.as_ref());
            let recommended_actions = recommend_actions(
                zone_id,
                assessment.as_ref(),
                finding.as_ref(),
                &event_findings,
                threat_level,
                !discrepancies.is_empty(),
            );

            zones.insert(
                zone_id.clone(),
                ZoneView {
                    assessment,
                    finding,
                    discrepancies,
                    recommended_actions,
                    threat_level,
                },
            );
        }

        let overall_threat_level = zones
            .values()
            .map(|z| z.threat_level)
            .max()
            .unwrap_or(ThreatLevel::Low);

        let confidence = (1.0
            - DEGRADED_ZONE_PENALTY * degraded.len() as f32
            - DISCREPANCY_PENALTY * discrepancy_count as f32
            - SINGLE_MODALITY_PENALTY * single_modality_count as f32)
            .clamp(0.0, 1.0);

        SituationSnapshot {
            generated_at: chrono::Utc::now(),
            overall_threat_level,
            zones,
            degraded_zones: degraded,
            confidence,
        }
    }
}

/// Partition findings into per-zone (last one per zone wins) and event-wide
fn split_findings(
    findings: Vec<ReportFinding>,
) -> (BTreeMap<String, ReportFinding>, Vec<ReportFinding>) {
    let mut by_zone: BTreeMap<String, ReportFinding> = BTreeMap::new();
    let mut event_wide = Vec::new();

    for finding in findings {
        match &finding.zone_id {
            Some(zone_id) => {
                match by_zone.get_mut(zone_id) {
                    // Merge repeated findings for the same zone instead
                    // of dropping the earlier one
                    Some(existing) => {
                        existing
                            .priority_issues
                            .extend(finding.priority_issues.clone());
                        existing.resource_status.extend(finding.resource_status.clone());
                        existing.summary.push_str("; ");
                        existing.summary.push_str(&finding.summary);
                        existing.confidence = existing.confidence.min(finding.confidence);
                    }
                    None => {
                        by_zone.insert(zone_id.clone(), finding);
                    }
                }
            }
            None => event_wide.push(finding),
        }
    }

    (by_zone, event_wide)
}

/// Cross-modality disagreement detection
///
/// Flags the two asymmetric cases: video looks benign while the report
/// raises priority issues, and video looks alarming while the report is
/// issue-free. Either one is worth an operator's attention.
fn detect_discrepancies(
    assessment: Option<&ZoneAssessment>,
    finding: Option<&ReportFinding>,
) -> Vec<String> {
    let (Some(a), Some(f)) = (assessment, finding) else {
        return Vec::new();
    };

    let mut discrepancies = Vec::new();

    if a.behavior.is_benign() && !f.priority_issues.is_empty() {
        discrepancies.push(format!(
            "Video shows {} crowd but field report raises {} priority issue(s): {}",
            a.behavior.as_str(),
            f.priority_issues.len(),
            f.priority_issues.join("; ")
        ));
    }

    let vision_alarming =
        !a.behavior.is_benign() && a.behavior != vigil_common::types::CrowdBehavior::Unknown
            || a.crowd_density == CrowdDensity::Critical;
    if vision_alarming && f.priority_issues.is_empty() {
        discrepancies.push(format!(
            "Video shows {} density with {} behavior but field report raises no issues",
            a.crowd_density.as_str(),
            a.behavior.as_str()
        ));
    }

    discrepancies
}

/// Derive a zone's threat level from both modalities
///
/// Unknowns count as moderate evidence, not as safe. Three or more
/// combined risk indicators raise the level by one.
fn zone_threat(assessment: Option<&ZoneAssessment>, finding: Option<&ReportFinding>) -> ThreatLevel {
    let vision_level = assessment
        .map(|a| a.crowd_density.level().max(a.behavior.level()))
        .unwrap_or(0);

    let report_level = finding
        .map(|f| match f.priority_issues.len() {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 3,
        })
        .unwrap_or(0);

    let mut level = vision_level.max(report_level);

    let risk_count = assessment.map(|a| a.risks.len()).unwrap_or(0)
        + finding.map(|f| f.priority_issues.len()).unwrap_or(0);
    if risk_count >= RISK_BUMP_THRESHOLD {
        level = (level + 1).min(3);
    }

    ThreatLevel::from_level(level)
}

/// Build the zone's action list, highest priority first
fn recommend_actions(
    zone_id: &str,
    assessment: Option<&ZoneAssessment>,
    finding: Option<&ReportFinding>,
    event_findings: &[ReportFinding],
    threat_level: ThreatLevel,
    has_discrepancy: bool,
) -> Vec<String> {
    let mut actions = Vec::new();

    match threat_level {
        ThreatLevel::Critical => {
            actions.push(format!(
                "Deploy incident response to {} immediately and prepare crowd dispersal",
                zone_id
            ));
        }
        ThreatLevel::High => {
            actions.push(format!(
                "Increase staff presence in {} and ready contingency measures",
                zone_id
            ));
        }
        ThreatLevel::Moderate => {
            actions.push(format!("Increase monitoring frequency for {}", zone_id));
        }
        ThreatLevel::Low => {}
    }

    if has_discrepancy {
        actions.push(format!(
            "Dispatch a spotter to {} to resolve conflicting video and report signals",
            zone_id
        ));
    }

    if let Some(a) = assessment {
        for risk in &a.risks {
            actions.push(format!("Address observed risk in {}: {}", zone_id, risk));
        }
        if a.crowd_density == CrowdDensity::Unknown {
            actions.push(format!(
                "Restore or verify video coverage for {} (density unknown)",
                zone_id
            ));
        }
    }

    if let Some(f) = finding {
        for issue in &f.priority_issues {
            actions.push(format!("Follow up reported issue in {}: {}", zone_id, issue));
        }
    }

    // Event-wide findings contribute their issues to every zone
    for ef in event_findings {
        for issue in &ef.priority_issues {
            actions.push(format!("Event-wide: {}", issue));
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_common::types::CrowdBehavior;

    fn assessment(zone: &str, density: CrowdDensity, behavior: CrowdBehavior) -> ZoneAssessment {
        ZoneAssessment {
            zone_id: zone.to_string(),
            crowd_density: density,
            behavior,
            risks: Vec::new(),
            infrastructure_notes: Vec::new(),
            confidence: 0.9,
            timestamp: Utc::now(),
        }
    }

    fn finding(zone: Option<&str>, issues: &[&str]) -> ReportFinding {
        ReportFinding {
            zone_id: zone.map(String::from),
            summary: "test finding".to_string(),
            priority_issues: issues.iter().map(|s| s.to_string()).collect(),
            resource_status: BTreeMap::new(),
            confidence: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_overall_threat_is_max_of_zones() {
        let snapshot = SnapshotFuser::fuse(
            vec![
                assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm),
                assessment("Zone B", CrowdDensity::Critical, CrowdBehavior::Agitated),
            ],
            Vec::new(),
            BTreeMap::new(),
        );
        assert_eq!(snapshot.overall_threat_level, ThreatLevel::Critical);
        assert_eq!(snapshot.zones["Zone A"].threat_level, ThreatLevel::Low);
    }

    #[test]
    fn test_benign_video_with_priority_issues_is_a_discrepancy() {
        let snapshot = SnapshotFuser::fuse(
            vec![assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm)],
            vec![finding(Some("Zone A"), &["gate crush reported"])],
            BTreeMap::new(),
        );
        let view = &snapshot.zones["Zone A"];
        assert_eq!(view.discrepancies.len(), 1);
        assert!(view.discrepancies[0].contains("gate crush reported"));
        assert!(
            view.recommended_actions.iter().any(|a| a.contains("spotter")),
            "discrepancy must produce a verification action"
        );
    }

    #[test]
    fn test_alarming_video_with_quiet_report_is_a_discrepancy() {
        let snapshot = SnapshotFuser::fuse(
            vec![assessment("Zone B", CrowdDensity::High, CrowdBehavior::Agitated)],
            vec![finding(Some("Zone B"), &[])],
            BTreeMap::new(),
        );
        assert_eq!(snapshot.zones["Zone B"].discrepancies.len(), 1);
    }

    #[test]
    fn test_unknown_density_is_not_treated_as_safe() {
        let snapshot = SnapshotFuser::fuse(
            vec![assessment("Zone A", CrowdDensity::Unknown, CrowdBehavior::Unknown)],
            Vec::new(),
            BTreeMap::new(),
        );
        assert_eq!(
            snapshot.zones["Zone A"].threat_level,
            ThreatLevel::Moderate,
            "unknown observations must map to moderate, not low"
        );
    }

    #[test]
    fn test_three_risks_raise_threat_one_level() {
        let mut a = assessment("Zone C", CrowdDensity::Moderate, CrowdBehavior::Calm);
        a.risks = vec![
            "bottleneck at exit".to_string(),
            "barrier leaning".to_string(),
            "wet surface".to_string(),
        ];
        let snapshot = SnapshotFuser::fuse(vec![a], Vec::new(), BTreeMap::new());
        assert_eq!(snapshot.zones["Zone C"].threat_level, ThreatLevel::High);
    }

    #[test]
    fn test_confidence_decreases_with_degraded_zones() {
        let base = SnapshotFuser::fuse(
            vec![assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm)],
            Vec::new(),
            BTreeMap::new(),
        );

        let mut degraded = BTreeMap::new();
        degraded.insert("Zone B".to_string(), "model_timeout".to_string());
        let with_degraded = SnapshotFuser::fuse(
            vec![assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm)],
            Vec::new(),
            degraded.clone(),
        );

        assert!(with_degraded.confidence < base.confidence);
        assert_eq!(
            with_degraded.degraded_zones.get("Zone B").map(String::as_str),
            Some("model_timeout")
        );
    }

    #[test]
    fn test_single_modality_zone_costs_confidence() {
        let both = SnapshotFuser::fuse(
            vec![assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm)],
            vec![finding(Some("Zone A"), &[])],
            BTreeMap::new(),
        );
        let vision_only = SnapshotFuser::fuse(
            vec![assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm)],
            Vec::new(),
            BTreeMap::new(),
        );
        assert!(vision_only.confidence < both.confidence);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let inputs = || {
            (
                vec![
                    assessment("Zone A", CrowdDensity::High, CrowdBehavior::Restless),
                    assessment("Zone B", CrowdDensity::Low, CrowdBehavior::Calm),
                ],
                vec![finding(Some("Zone A"), &["overcrowding"])],
                BTreeMap::new(),
            )
        };

        let (a1, f1, d1) = inputs();
        let (a2, f2, d2) = inputs();
        let s1 = SnapshotFuser::fuse(a1, f1, d1);
        let s2 = SnapshotFuser::fuse(a2, f2, d2);

        assert_eq!(s1.overall_threat_level, s2.overall_threat_level);
        assert_eq!(s1.confidence, s2.confidence);
        assert_eq!(s1.zone_ids(), s2.zone_ids());
        assert_eq!(
            s1.zones["Zone A"].recommended_actions,
            s2.zones["Zone A"].recommended_actions
        );
    }

    #[test]
    fn test_event_wide_finding_reaches_every_zone() {
        let snapshot = SnapshotFuser::fuse(
            vec![
                assessment("Zone A", CrowdDensity::Low, CrowdBehavior::Calm),
                assessment("Zone B", CrowdDensity::Low, CrowdBehavior::Calm),
            ],
            vec![finding(None, &["severe weather inbound"])],
            BTreeMap::new(),
        );
        for view in snapshot.zones.values() {
            assert!(view
                .recommended_actions
                .iter()
                .any(|a| a.contains("severe weather inbound")));
        }
    }

    #[test]
    fn test_event_wide_only_input_creates_pseudo_zone() {
        let snapshot = SnapshotFuser::fuse(
            Vec::new(),
            vec![finding(None, &["power outage"])],
            BTreeMap::new(),
        );
        assert!(snapshot.zones.contains_key("event"));
    }

    #[test]
    fn test_repeated_zone_findings_are_merged() {
        let snapshot = SnapshotFuser::fuse(
            Vec::new(),
            vec![
                finding(Some("Zone A"), &["issue one"]),
                finding(Some("Zone A"), &["issue two"]),
            ],
            BTreeMap::new(),
        );
        let merged = snapshot.zones["Zone A"].finding.as_ref().unwrap();
        assert_eq!(merged.priority_issues.len(), 2);
    }
}
