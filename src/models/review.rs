use serde::{Deserialize, Serialize};
use strum::Display;

/// Ad copy as produced by the copy generator or the reviser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdCopy {
    pub primary_text: String,
    pub headline: String,
}

impl AdCopy {
    /// Full text of the ad, used for phrase scanning.
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.headline, self.primary_text)
    }

    /// Whether either field contains `needle`, ignoring case.
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        find_ignore_case(&self.primary_text, needle, 0).is_some()
            || find_ignore_case(&self.headline, needle, 0).is_some()
    }
}

/// Byte span in `haystack` of the first case-insensitive match of `needle`
/// starting at or after byte `from`.
///
/// Characters are compared one by one, so the span always slices the
/// original text even where lowercasing would change byte lengths.
pub fn find_ignore_case(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let rest = haystack.get(from..)?;
    rest.char_indices().find_map(|(offset, _)| {
        let start = from + offset;
        match_len(&haystack[start..], needle).map(|len| (start, start + len))
    })
}

/// Length in bytes of the prefix of `text` matching `needle`, if any.
fn match_len(text: &str, needle: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in needle.chars() {
        let (_, actual) = chars.next()?;
        if actual != expected && !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(idx, _)| idx))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceOutcome {
    Pass,
    PassWithFixes,
    Fail,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Red,
    Yellow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceFlag {
    pub quoted_text: String,
    pub rule: String,
    pub severity: Severity,
    #[serde(default)]
    pub suggested_fix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceVerdict {
    pub outcome: ComplianceOutcome,
    #[serde(default)]
    pub flags: Vec<ComplianceFlag>,
}

impl ComplianceVerdict {
    pub fn pass() -> Self {
        Self {
            outcome: ComplianceOutcome::Pass,
            flags: Vec::new(),
        }
    }

    pub fn requires_fix(&self) -> bool {
        self.outcome != ComplianceOutcome::Pass
    }

    /// Add a flag, escalating the outcome to match its severity.
    pub fn add_flag(&mut self, flag: ComplianceFlag) {
        self.outcome = match (self.outcome, flag.severity) {
            (_, Severity::Red) => ComplianceOutcome::Fail,
            (ComplianceOutcome::Pass, Severity::Yellow) => ComplianceOutcome::PassWithFixes,
            (current, _) => current,
        };
        self.flags.push(flag);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DomainOutcome {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Accuracy {
    Accurate,
    Overstated,
    Inaccurate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EvidenceStrength {
    Strong,
    Moderate,
    Weak,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub claim_text: String,
    pub accuracy: Accuracy,
    pub evidence_strength: EvidenceStrength,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainVerdict {
    pub outcome: DomainOutcome,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl DomainVerdict {
    pub fn green() -> Self {
        Self {
            outcome: DomainOutcome::Green,
            claims: Vec::new(),
        }
    }

    /// Claims that are not fully accurate.
    pub fn flagged_claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims
            .iter()
            .filter(|c| c.accuracy != Accuracy::Accurate)
    }

    pub fn requires_fix(&self) -> bool {
        self.flagged_claims().next().is_some()
    }
}

/// Revision is needed unless compliance passed and every claim is accurate.
pub fn revision_required(compliance: &ComplianceVerdict, domain: &DomainVerdict) -> bool {
    compliance.requires_fix() || domain.requires_fix()
}
