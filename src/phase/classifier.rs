//! Label classifier: derive an issue's current phase from its label set.

use thiserror::Error;

use super::{LABEL_LGTM, Phase, is_reserved, phase_by_execution, phase_by_trigger};

/// Why a label set could not be classified.
///
/// A well-formed issue carries exactly one reserved label (the LGTM label
/// excepted). Anything else is operator misconfiguration: it is reported,
/// never auto-healed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("no phase label present")]
    NoPhaseLabel,

    #[error("ambiguous phase labels: {labels:?}")]
    AmbiguousPhaseLabels { labels: Vec<String> },

    #[error("unknown reserved label: {label}")]
    UnknownLabel { label: String },
}

/// Classify a label set into a [`Phase`].
///
/// The LGTM label is filtered out first; exactly one reserved label must
/// remain. Trigger labels win over execution labels, which realizes the
/// queue -> plan auto-transition (`soba:queued` triggers plan) and assigns
/// the shared completion labels to the phase they trigger.
pub fn classify<'a, I>(labels: I) -> Result<Phase, ClassificationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let reserved: Vec<&str> = labels
        .into_iter()
        .filter(|l| is_reserved(l) && *l != LABEL_LGTM)
        .collect();

    match reserved.as_slice() {
        [] => Err(ClassificationError::NoPhaseLabel),
        [label] => {
            if let Some(def) = phase_by_trigger(label) {
                return Ok(def.phase);
            }
            if let Some(def) = phase_by_execution(label) {
                return Ok(def.phase);
            }
            Err(ClassificationError::UnknownLabel {
                label: (*label).to_string(),
            })
        }
        many => Err(ClassificationError::AmbiguousPhaseLabels {
            labels: many.iter().map(|l| (*l).to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_each_lifecycle_label() {
        let cases = [
            (LABEL_TODO, Phase::Queue),
            (LABEL_QUEUED, Phase::Plan),
            (LABEL_PLANNING, Phase::Plan),
            (LABEL_READY, Phase::Implement),
            (LABEL_DOING, Phase::Implement),
            (LABEL_REVIEW_REQUESTED, Phase::Review),
            (LABEL_REVIEWING, Phase::Review),
            (LABEL_DONE, Phase::Merge),
            (LABEL_REQUIRES_CHANGES, Phase::Revise),
            (LABEL_REVISING, Phase::Revise),
            (LABEL_MERGED, Phase::Merge),
        ];
        for (label, expected) in cases {
            assert_eq!(classify([label]), Ok(expected), "label {}", label);
        }
    }

    #[test]
    fn test_non_reserved_labels_are_ignored() {
        assert_eq!(classify(["bug", "soba:doing", "help wanted"]), Ok(Phase::Implement));
    }

    #[test]
    fn test_lgtm_is_filtered() {
        assert_eq!(classify(["soba:lgtm", "soba:reviewing"]), Ok(Phase::Review));
        assert_eq!(classify(["soba:lgtm"]), Err(ClassificationError::NoPhaseLabel));
    }

    #[test]
    fn test_zero_reserved_labels() {
        assert_eq!(classify(["bug"]), Err(ClassificationError::NoPhaseLabel));
        assert_eq!(classify([]), Err(ClassificationError::NoPhaseLabel));
    }

    #[test]
    fn test_multiple_reserved_labels() {
        let err = classify(["soba:planning", "soba:ready"]).unwrap_err();
        match err {
            ClassificationError::AmbiguousPhaseLabels { labels } => {
                assert_eq!(labels, vec!["soba:planning".to_string(), "soba:ready".to_string()]);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_reserved_label() {
        assert_eq!(
            classify(["soba:wat"]),
            Err(ClassificationError::UnknownLabel {
                label: "soba:wat".to_string()
            })
        );
    }

    proptest! {
        // Totality: every legal single-reserved-label input classifies, and
        // every zero-or-many input fails with the documented error.
        #[test]
        fn prop_classifier_totality(
            extra in proptest::collection::vec("[a-z]{1,8}", 0..4),
            idx in 0usize..11,
        ) {
            let lifecycle = [
                LABEL_TODO, LABEL_QUEUED, LABEL_PLANNING, LABEL_READY, LABEL_DOING,
                LABEL_REVIEW_REQUESTED, LABEL_REVIEWING, LABEL_DONE,
                LABEL_REQUIRES_CHANGES, LABEL_REVISING, LABEL_MERGED,
            ];
            let mut labels: Vec<&str> = extra.iter().map(|s| s.as_str()).collect();
            labels.push(lifecycle[idx]);
            prop_assert!(classify(labels.iter().copied()).is_ok());

            let without: Vec<&str> = extra.iter().map(|s| s.as_str()).collect();
            prop_assert_eq!(
                classify(without.iter().copied()),
                Err(ClassificationError::NoPhaseLabel)
            );
        }

        #[test]
        fn prop_two_lifecycle_labels_are_ambiguous(a in 0usize..11, b in 0usize..11) {
            prop_assume!(a != b);
            let lifecycle = [
                LABEL_TODO, LABEL_QUEUED, LABEL_PLANNING, LABEL_READY, LABEL_DOING,
                LABEL_REVIEW_REQUESTED, LABEL_REVIEWING, LABEL_DONE,
                LABEL_REQUIRES_CHANGES, LABEL_REVISING, LABEL_MERGED,
            ];
            let result = classify([lifecycle[a], lifecycle[b]]);
            prop_assert!(
                matches!(result, Err(ClassificationError::AmbiguousPhaseLabels { .. })),
                "expected AmbiguousPhaseLabels error"
            );
        }
    }
}
