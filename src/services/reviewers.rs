//! Compliance and domain-accuracy reviewers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{BannedPhrase, PolicyConfig};
use crate::error::ExternalError;
use crate::models::review::{
    find_ignore_case, AdCopy, ComplianceFlag, ComplianceVerdict, DomainVerdict,
};
use crate::pipeline::collaborators::{ComplianceReviewer, DomainReviewer};
use crate::services::llm::{ContentPart, LlmClient};

const COMPLIANCE_PROMPT: &str = concat!(
    "You are an ad policy reviewer for paid social platforms. ",
    "Check the ad copy for personal attributes, health and medical claims, ",
    "unrealistic outcomes, before/after promises, misleading urgency and prohibited content. ",
    "Return ONLY valid JSON: {\"outcome\": \"PASS\"|\"PASS_WITH_FIXES\"|\"FAIL\", ",
    "\"flags\": [{\"quoted_text\": string (verbatim from the copy), \"rule\": string, ",
    "\"severity\": \"RED\"|\"YELLOW\", \"suggested_fix\": string}]}. ",
    "Use RED for anything that would get the ad rejected, YELLOW for risky wording."
);

const DOMAIN_PROMPT: &str = concat!(
    "You are a subject-matter fact checker. List every factual or product claim in the ad copy ",
    "and grade it. Return ONLY valid JSON: {\"outcome\": \"GREEN\"|\"YELLOW\"|\"RED\", ",
    "\"claims\": [{\"claim_text\": string, \"accuracy\": \"ACCURATE\"|\"OVERSTATED\"|\"INACCURATE\", ",
    "\"evidence_strength\": \"STRONG\"|\"MODERATE\"|\"WEAK\"|\"NONE\", ",
    "\"issue\": string or null, \"fix\": string or null}]}."
);

fn copy_message(copy: &AdCopy) -> String {
    format!(
        "Headline: {}\nPrimary text:\n{}",
        copy.headline, copy.primary_text
    )
}

/// Flags for every banned phrase found in the copy.
///
/// Matching ignores case and only counts whole words, so "cure" does not
/// match "secure".
pub fn scan_banned_phrases(copy: &AdCopy, banned: &[BannedPhrase]) -> Vec<ComplianceFlag> {
    let text = copy.full_text();
    banned
        .iter()
        .filter_map(|entry| {
            let (start, end) = find_whole(&text, &entry.phrase)?;
            Some(ComplianceFlag {
                quoted_text: text[start..end].to_string(),
                rule: entry.rule.clone(),
                severity: entry.severity,
                suggested_fix: format!("Remove or rephrase \"{}\"", entry.phrase),
            })
        })
        .collect()
}

fn find_whole(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let is_word = |c: char| c.is_alphanumeric();
    let mut from = 0;
    while let Some((start, end)) = find_ignore_case(haystack, needle, from) {
        let before_ok = !needle.starts_with(is_word)
            || !haystack[..start].chars().next_back().is_some_and(is_word);
        let after_ok =
            !needle.ends_with(is_word) || !haystack[end..].chars().next().is_some_and(is_word);
        if before_ok && after_ok {
            return Some((start, end));
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// Compliance review from the LLM, merged with the local banned-phrase scan.
pub struct LlmComplianceReviewer {
    llm: Arc<LlmClient>,
    policy: Arc<PolicyConfig>,
}

impl LlmComplianceReviewer {
    pub fn new(llm: Arc<LlmClient>, policy: Arc<PolicyConfig>) -> Self {
        Self { llm, policy }
    }
}

/// Add local scan hits the remote reviewer did not already flag.
pub fn merge_local_flags(verdict: &mut ComplianceVerdict, local: Vec<ComplianceFlag>) {
    for flag in local {
        let already = verdict
            .flags
            .iter()
            .any(|f| f.quoted_text.eq_ignore_ascii_case(&flag.quoted_text));
        if !already {
            verdict.add_flag(flag);
        }
    }
}

#[async_trait]
impl ComplianceReviewer for LlmComplianceReviewer {
    async fn review(&self, draft: &AdCopy) -> Result<ComplianceVerdict, ExternalError> {
        let mut verdict: ComplianceVerdict = self
            .llm
            .complete_json(
                "compliance reviewer",
                COMPLIANCE_PROMPT,
                vec![ContentPart::text(copy_message(draft))],
                0.0,
            )
            .await?;

        merge_local_flags(&mut verdict, scan_banned_phrases(draft, &self.policy.banned_phrases));
        Ok(verdict)
    }
}

pub struct LlmDomainReviewer {
    llm: Arc<LlmClient>,
}

impl LlmDomainReviewer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DomainReviewer for LlmDomainReviewer {
    async fn review(&self, draft: &AdCopy) -> Result<DomainVerdict, ExternalError> {
        self.llm
            .complete_json(
                "domain reviewer",
                DOMAIN_PROMPT,
                vec![ContentPart::text(copy_message(draft))],
                0.0,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::review::{ComplianceOutcome, Severity};

    fn copy(primary: &str) -> AdCopy {
        AdCopy {
            primary_text: primary.to_string(),
            headline: "Sleep better".to_string(),
        }
    }

    fn banned(phrase: &str, severity: Severity) -> BannedPhrase {
        BannedPhrase {
            phrase: phrase.to_string(),
            rule: "test_rule".to_string(),
            severity,
        }
    }

    #[test]
    fn test_scan_finds_phrase_case_insensitive() {
        let flags = scan_banned_phrases(
            &copy("This Miracle pillow changes everything"),
            &[banned("miracle", Severity::Yellow)],
        );
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].quoted_text, "Miracle");
        assert_eq!(flags[0].severity, Severity::Yellow);
    }

    #[test]
    fn test_scan_respects_word_boundaries() {
        let flags = scan_banned_phrases(
            &copy("Secure checkout, then cure your back pain"),
            &[banned("cure", Severity::Red)],
        );
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].quoted_text, "cure");

        let none = scan_banned_phrases(&copy("Secure checkout"), &[banned("cure", Severity::Red)]);
        assert!(none.is_empty());
    }

    #[test]
    fn test_scan_symbol_phrases() {
        let flags = scan_banned_phrases(&copy("The #1 pillow"), &[banned("#1", Severity::Yellow)]);
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn test_scan_quotes_original_text_after_non_ascii() {
        // "İ" grows when lowercased; the quote must still come from the original
        let copy = AdCopy {
            headline: "İİ".to_string(),
            primary_text: "we CURE it".to_string(),
        };
        let flags = scan_banned_phrases(&copy, &[banned("cure", Severity::Red)]);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].quoted_text, "CURE");
        assert!(copy.contains_ignore_case(&flags[0].quoted_text));
    }

    #[test]
    fn test_merge_escalates_and_dedupes() {
        let mut verdict = ComplianceVerdict {
            outcome: ComplianceOutcome::PassWithFixes,
            flags: vec![ComplianceFlag {
                quoted_text: "miracle".into(),
                rule: "exaggeration".into(),
                severity: Severity::Yellow,
                suggested_fix: String::new(),
            }],
        };
        let local = scan_banned_phrases(
            &copy("A miracle that will cure insomnia"),
            &[banned("miracle", Severity::Yellow), banned("cure", Severity::Red)],
        );
        merge_local_flags(&mut verdict, local);

        assert_eq!(verdict.flags.len(), 2);
        assert_eq!(verdict.outcome, ComplianceOutcome::Fail);
    }
}
