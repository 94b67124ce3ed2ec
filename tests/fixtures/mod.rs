//! Sample rows, copy and verdicts shared by the pipeline tests

#![allow(dead_code)]

use ad_pipeline::models::asset::ResolvedAsset;
use ad_pipeline::models::batch::{BatchRequest, BatchRow};
use ad_pipeline::models::review::{
    Accuracy, AdCopy, Claim, ComplianceFlag, ComplianceOutcome, ComplianceVerdict, DomainOutcome,
    DomainVerdict, EvidenceStrength, Severity,
};

/// Claims the policy allows, worded as approved.
pub const APPROVED_CLAIMS: &[&str] = &[
    "Supports restful sleep",
    "Made with organic ingredients",
];

pub fn image_row(name: &str) -> BatchRow {
    BatchRow {
        source_ref: format!("https://cdn.example.com/creatives/{name}.png"),
        angle: "pain point".to_string(),
        format: "static".to_string(),
        messenger: "founder".to_string(),
        media_type: "image".to_string(),
        ad_set_id: None,
    }
}

pub fn video_row(name: &str) -> BatchRow {
    BatchRow {
        source_ref: format!("https://cdn.example.com/creatives/{name}.mp4"),
        angle: "testimonial".to_string(),
        format: "ugc".to_string(),
        messenger: "customer".to_string(),
        media_type: "video".to_string(),
        ad_set_id: None,
    }
}

pub fn request(rows: Vec<BatchRow>, concurrency: usize) -> BatchRequest {
    BatchRequest {
        rows,
        concurrency: Some(concurrency),
        dry_run: None,
    }
}

/// A tiny PNG signature, enough for content sniffing.
pub fn png_asset() -> ResolvedAsset {
    ResolvedAsset {
        bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D],
        content_type: "image/png".to_string(),
    }
}

pub fn analysis() -> serde_json::Value {
    serde_json::json!({
        "summary": "A woman wakes up refreshed next to the pillow.",
        "hook": "Alarm clock goes off, she smiles",
        "visual_elements": ["bedroom", "pillow", "morning light"],
        "claims_made": ["better sleep"],
        "tone": "warm"
    })
}

pub fn clean_copy() -> AdCopy {
    AdCopy {
        primary_text: "Wake up ready for the day. Our pillow supports restful sleep.".to_string(),
        headline: "Sleep, upgraded".to_string(),
    }
}

/// Copy containing a medical claim the compliance reviewer flags RED.
pub fn risky_copy() -> AdCopy {
    AdCopy {
        primary_text: "This pillow will cure insomnia in one night.".to_string(),
        headline: "Sleep, upgraded".to_string(),
    }
}

pub fn red_flag(quoted: &str) -> ComplianceFlag {
    ComplianceFlag {
        quoted_text: quoted.to_string(),
        rule: "medical_claim".to_string(),
        severity: Severity::Red,
        suggested_fix: "Describe comfort, not treatment".to_string(),
    }
}

pub fn failing_compliance(quoted: &str) -> ComplianceVerdict {
    ComplianceVerdict {
        outcome: ComplianceOutcome::Fail,
        flags: vec![red_flag(quoted)],
    }
}

pub fn overstated_domain(claim_text: &str) -> DomainVerdict {
    DomainVerdict {
        outcome: DomainOutcome::Yellow,
        claims: vec![Claim {
            claim_text: claim_text.to_string(),
            accuracy: Accuracy::Overstated,
            evidence_strength: EvidenceStrength::Weak,
            issue: Some("no study supports the nightly promise".to_string()),
            fix: None,
        }],
    }
}
