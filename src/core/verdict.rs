//! Reviewer verdicts and their defensive classification.
//!
//! A [`ReviewVerdict`] is untrusted model output. Its shape is checked at
//! parse time: all four fields are required and unknown fields are
//! rejected. Its contents are repaired afterwards: indices may be
//! negative, past the end of the batch, duplicated, listed as both valid
//! and invalid, or left out of both lists. [`ReviewVerdict::classify`] turns it into a
//! [`Classification`] in which every batch index appears exactly once.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The reviewer's routing recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Search again.
    Retry,
    /// Enough evidence; synthesize an answer.
    Finalize,
}

impl Decision {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One review cycle's verdict over the current batch.
///
/// Field names on the wire follow the structured-output schema the
/// reviewer model is asked to fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReviewVerdict {
    /// Free-text analysis of the batch, ending with whether to answer or keep looking.
    #[serde(rename = "thought_process")]
    pub rationale: String,
    /// Batch indices (0-based) of results with any useful information.
    #[serde(rename = "valid_results")]
    pub valid: Vec<i64>,
    /// Batch indices (0-based) of results that cannot help answer the question.
    #[serde(rename = "invalid_results")]
    pub invalid: Vec<i64>,
    /// `retry` to search again, `finalize` to answer.
    pub decision: Decision,
}

impl ReviewVerdict {
    /// Creates a verdict.
    pub fn new(
        rationale: impl Into<String>,
        valid: Vec<i64>,
        invalid: Vec<i64>,
        decision: Decision,
    ) -> Self {
        Self {
            rationale: rationale.into(),
            valid,
            invalid,
            decision,
        }
    }

    /// Partitions `0..batch_len` into valid and invalid indices.
    ///
    /// Repair rules, applied in order:
    /// - negative or `>= batch_len` indices are dropped,
    /// - repeated indices within one list are collapsed,
    /// - an index in both lists counts as valid,
    /// - an index in neither list counts as valid.
    ///
    /// Both output lists are in ascending batch order.
    #[must_use]
    pub fn classify(&self, batch_len: usize) -> Classification {
        let mut repairs = VerdictRepairs::default();
        let in_valid = mark(&self.valid, batch_len, &mut repairs);
        let in_invalid = mark(&self.invalid, batch_len, &mut repairs);

        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for idx in 0..batch_len {
            match (in_valid[idx], in_invalid[idx]) {
                (true, true) => {
                    repairs.conflicting.push(idx);
                    valid.push(idx);
                }
                (true, false) => valid.push(idx),
                (false, true) => invalid.push(idx),
                (false, false) => {
                    repairs.unclassified.push(idx);
                    valid.push(idx);
                }
            }
        }

        Classification {
            valid,
            invalid,
            repairs,
        }
    }
}

fn mark(indices: &[i64], batch_len: usize, repairs: &mut VerdictRepairs) -> Vec<bool> {
    let mut seen = vec![false; batch_len];
    for &raw in indices {
        let Some(idx) = usize::try_from(raw).ok().filter(|&i| i < batch_len) else {
            repairs.out_of_range.push(raw);
            continue;
        };
        if seen[idx] {
            repairs.duplicates += 1;
        } else {
            seen[idx] = true;
        }
    }
    seen
}

/// A verdict after repair: every batch index is in exactly one list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Indices to move into the vetted set.
    pub valid: Vec<usize>,
    /// Indices to move into the discarded set.
    pub invalid: Vec<usize>,
    /// What had to be fixed in the raw verdict.
    pub repairs: VerdictRepairs,
}

/// Record of repairs applied to a malformed verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerdictRepairs {
    /// Indices outside `[0, batch_len)`, dropped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub out_of_range: Vec<i64>,
    /// Number of repeated index entries collapsed.
    #[serde(skip_serializing_if = "is_zero")]
    pub duplicates: usize,
    /// Indices listed as both valid and invalid (kept as valid).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicting: Vec<usize>,
    /// Indices the reviewer omitted (kept as valid).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unclassified: Vec<usize>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl VerdictRepairs {
    /// Returns `true` if the verdict needed no repair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.out_of_range.is_empty()
            && self.duplicates == 0
            && self.conflicting.is_empty()
            && self.unclassified.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_clean_verdict() {
        let verdict = ReviewVerdict::new("ok", vec![0, 2], vec![1], Decision::Finalize);
        let c = verdict.classify(3);
        assert_eq!(c.valid, vec![0, 2]);
        assert_eq!(c.invalid, vec![1]);
        assert!(c.repairs.is_clean());
    }

    #[test_case(vec![5], vec![0], 2 => (vec![1], vec![0]); "past end dropped, omitted becomes valid")]
    #[test_case(vec![-1, 0], vec![1], 2 => (vec![0], vec![1]); "negative dropped")]
    #[test_case(vec![0, 0], vec![1, 1], 2 => (vec![0], vec![1]); "duplicates collapsed")]
    #[test_case(vec![0], vec![0, 1], 2 => (vec![0], vec![1]); "conflict kept valid")]
    #[test_case(vec![], vec![], 0 => (vec![], vec![]); "empty batch")]
    #[test_case(vec![3, 7], vec![-2], 0 => (vec![], vec![]); "empty batch ignores garbage")]
    fn test_classify(valid: Vec<i64>, invalid: Vec<i64>, len: usize) -> (Vec<usize>, Vec<usize>) {
        let c = ReviewVerdict::new("r", valid, invalid, Decision::Retry).classify(len);
        (c.valid, c.invalid)
    }

    #[test]
    fn test_repairs_recorded() {
        let verdict = ReviewVerdict::new("r", vec![0, 0, 9], vec![0, -4], Decision::Retry);
        let c = verdict.classify(3);
        assert_eq!(c.repairs.out_of_range, vec![9, -4]);
        assert_eq!(c.repairs.duplicates, 1);
        assert_eq!(c.repairs.conflicting, vec![0]);
        assert_eq!(c.repairs.unclassified, vec![1, 2]);
        assert!(!c.repairs.is_clean());
    }

    #[test]
    fn test_deserialize_wire_names() {
        let json = r#"{
            "thought_process": "first result answers it",
            "valid_results": [0],
            "invalid_results": [1, 2],
            "decision": "finalize"
        }"#;
        let verdict: ReviewVerdict =
            serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(verdict.rationale, "first result answers it");
        assert_eq!(verdict.valid, vec![0]);
        assert_eq!(verdict.decision, Decision::Finalize);
    }

    #[test]
    fn test_missing_index_lists_rejected() {
        let json = r#"{"thought_process": "none of these are relevant", "decision": "finalize"}"#;
        assert!(serde_json::from_str::<ReviewVerdict>(json).is_err());
        let json = r#"{"thought_process": "", "valid_results": [0], "decision": "retry"}"#;
        assert!(serde_json::from_str::<ReviewVerdict>(json).is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{"thought_process": "", "valid_results": [], "invalid_results": [],
                       "decision": "retry", "confidence": 0.9}"#;
        assert!(serde_json::from_str::<ReviewVerdict>(json).is_err());
    }

    #[test]
    fn test_schema_requires_every_field() {
        let schema = schemars::schema_for!(ReviewVerdict).to_value();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        for field in ["thought_process", "valid_results", "invalid_results", "decision"] {
            assert!(required.contains(&field), "{field} not required");
        }
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_unknown_decision_rejected() {
        let json = r#"{"thought_process": "", "valid_results": [], "invalid_results": [], "decision": "maybe"}"#;
        assert!(serde_json::from_str::<ReviewVerdict>(json).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_every_index_classified_once(
            valid in proptest::collection::vec(-3i64..12, 0..12),
            invalid in proptest::collection::vec(-3i64..12, 0..12),
            len in 0usize..8,
        ) {
            let c = ReviewVerdict::new("r", valid, invalid, Decision::Retry).classify(len);
            let mut all: Vec<usize> = c.valid.iter().chain(c.invalid.iter()).copied().collect();
            all.sort_unstable();
            proptest::prop_assert_eq!(all, (0..len).collect::<Vec<_>>());
        }
    }
}
