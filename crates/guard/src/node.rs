//! The guard node: one safe/unsafe verdict per response text.

use crate::detector::{self, SqlCandidate};
use crate::validator::{self, SqlLimits, ValidationVerdict};
use serde::Serialize;
use tracing::debug;

/// One detected candidate together with its validation outcome.
#[derive(Debug, Clone, Serialize)]
pub struct GuardFinding {
    pub candidate: SqlCandidate,
    pub verdict: ValidationVerdict,
}

/// Aggregate outcome for one full response text.
///
/// `safe` is the AND over all per-candidate acceptances; a response with no
/// candidates is vacuously safe.
#[derive(Debug, Clone, Serialize)]
pub struct GuardVerdict {
    pub safe: bool,
    pub findings: Vec<GuardFinding>,
    pub summary: String,
}

/// Validates a turn's outgoing text for unsafe SQL before it reaches the user.
///
/// The guard runs after generation and is blind to how the SQL got into the
/// response — tool output echoed verbatim and model-generated raw SQL are
/// treated identically. It never mutates conversation state; the turn loop
/// interprets the verdict.
pub struct SqlGuard {
    limits: SqlLimits,
}

impl SqlGuard {
    pub fn new(limits: SqlLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SqlLimits {
        &self.limits
    }

    /// Evaluate one response text.
    pub fn check(&self, response_text: &str) -> GuardVerdict {
        let candidates = detector::detect(response_text);
        if candidates.is_empty() {
            return GuardVerdict {
                safe: true,
                findings: Vec::new(),
                summary: "no SQL detected".into(),
            };
        }

        let findings: Vec<GuardFinding> = candidates
            .into_iter()
            .map(|candidate| {
                let verdict = validator::validate(&candidate.text, &self.limits);
                GuardFinding { candidate, verdict }
            })
            .collect();

        let rejected: Vec<&GuardFinding> =
            findings.iter().filter(|f| !f.verdict.accepted).collect();
        let safe = rejected.is_empty();

        let summary = if safe {
            format!("{} SQL fragment(s) detected, all validated", findings.len())
        } else {
            let details = rejected
                .iter()
                .map(|f| f.verdict.reasons.join("; "))
                .collect::<Vec<_>>()
                .join(" | ");
            format!(
                "{} of {} SQL fragment(s) failed validation: {details}",
                rejected.len(),
                findings.len()
            )
        };

        debug!(
            fragments = findings.len(),
            rejected = rejected.len(),
            safe,
            "SQL guard evaluated response"
        );

        GuardVerdict {
            safe,
            findings,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SqlGuard {
        SqlGuard::new(SqlLimits::default())
    }

    #[test]
    fn response_without_sql_is_vacuously_safe() {
        let verdict = guard().check("Hello! How can I help you today?");
        assert!(verdict.safe);
        assert!(verdict.findings.is_empty());
        assert_eq!(verdict.summary, "no SQL detected");
    }

    #[test]
    fn conversational_select_is_safe() {
        let verdict = guard().check("please select a convenient time for the meeting");
        assert!(verdict.safe);
        assert!(verdict.findings.is_empty());
    }

    #[test]
    fn valid_select_in_code_block_is_safe() {
        let verdict = guard().check("Here's your query:\n```sql\nSELECT * FROM users WHERE age > 18\n```");
        assert!(verdict.safe);
        assert_eq!(verdict.findings.len(), 1);
        assert!(verdict.findings[0].verdict.accepted);
    }

    #[test]
    fn destructive_sql_is_unsafe() {
        let verdict = guard().check("Here's how to delete:\n```sql\nDELETE FROM users WHERE id = 1\n```");
        assert!(!verdict.safe);
        assert!(verdict.summary.contains("failed validation"));
        assert!(verdict.summary.contains("DELETE"));
    }

    #[test]
    fn bare_destructive_sql_is_unsafe() {
        let verdict = guard().check(
            "Sure, I'll help you delete all users. Here's the query:\n\nDELETE FROM users;\n\nDone.",
        );
        assert!(!verdict.safe);
    }

    #[test]
    fn one_bad_fragment_taints_the_response() {
        let text = "Safe one:\n```sql\nSELECT * FROM users\n```\nAnd a bad one:\n```sql\nDROP TABLE users\n```";
        let verdict = guard().check(text);
        assert!(!verdict.safe);
        assert_eq!(verdict.findings.len(), 2);
        assert!(verdict.findings.iter().any(|f| f.verdict.accepted));
        assert!(verdict.findings.iter().any(|f| !f.verdict.accepted));
        assert!(verdict.summary.starts_with("1 of 2"));
    }

    #[test]
    fn safe_iff_every_candidate_accepted() {
        let text = "Two reads:\n```sql\nSELECT * FROM a\n```\n```sql\nSELECT * FROM b\n```";
        let verdict = guard().check(text);
        assert!(verdict.safe);
        assert!(verdict.findings.iter().all(|f| f.verdict.accepted));
        assert_eq!(verdict.summary, "2 SQL fragment(s) detected, all validated");
    }

    #[test]
    fn limits_flow_through_to_validation() {
        let tight = SqlGuard::new(SqlLimits {
            max_joins: 1,
            max_subqueries: 1,
        });
        let verdict =
            tight.check("```sql\nSELECT * FROM a JOIN b ON a.id = b.id JOIN c ON b.id = c.id\n```");
        assert!(!verdict.safe);
        assert!(verdict.summary.contains("too many joins"));
    }

    #[test]
    fn empty_response_is_safe() {
        let verdict = guard().check("");
        assert!(verdict.safe);
    }
}
