//! Phase catalog: the fixed issue lifecycle and its label vocabulary.
//!
//! Labels in the `soba:` namespace are the authoritative workflow state. A
//! phase has a trigger label ("run this next"), an execution label
//! ("currently running"), and completion rules that name the phase an
//! external worker hands off to. The catalog is static and immutable.

mod classifier;

pub use classifier::{ClassificationError, classify};

/// Reserved label namespace. Only labels with this prefix affect scheduling.
pub const LABEL_PREFIX: &str = "soba:";

pub const LABEL_TODO: &str = "soba:todo";
pub const LABEL_QUEUED: &str = "soba:queued";
pub const LABEL_PLANNING: &str = "soba:planning";
pub const LABEL_READY: &str = "soba:ready";
pub const LABEL_DOING: &str = "soba:doing";
pub const LABEL_REVIEW_REQUESTED: &str = "soba:review-requested";
pub const LABEL_REVIEWING: &str = "soba:reviewing";
pub const LABEL_DONE: &str = "soba:done";
pub const LABEL_REQUIRES_CHANGES: &str = "soba:requires-changes";
pub const LABEL_REVISING: &str = "soba:revising";
pub const LABEL_MERGED: &str = "soba:merged";

/// PR-only approval label; ignored by issue classification.
pub const LABEL_LGTM: &str = "soba:lgtm";

/// One step in the fixed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Queue,
    Plan,
    Implement,
    Review,
    Revise,
    Merge,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Queue,
        Phase::Plan,
        Phase::Implement,
        Phase::Review,
        Phase::Revise,
        Phase::Merge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Queue => "queue",
            Phase::Plan => "plan",
            Phase::Implement => "implement",
            Phase::Review => "review",
            Phase::Revise => "revise",
            Phase::Merge => "merge",
        }
    }

    /// Catalog entry for this phase.
    pub fn def(&self) -> &'static PhaseDef {
        &CATALOG[*self as usize]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a phase is executed once triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    /// The label flip is the whole action.
    LabelOnly,
    /// An operator-supplied command runs in a tmux pane.
    Command,
}

/// What happens when an external worker attaches a completion label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRule {
    pub label: &'static str,
    /// Phase the completion hands off to.
    pub next_phase: Phase,
    /// Whether the execution label is removed as part of the handoff.
    pub remove_label: bool,
}

/// Next action derived from an (execution label, completion label) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextAction {
    pub remove_label: bool,
    pub next_phase: Phase,
}

/// Static definition of one phase.
#[derive(Debug)]
pub struct PhaseDef {
    pub phase: Phase,
    pub trigger: &'static str,
    pub execution: &'static str,
    pub completions: &'static [CompletionRule],
    pub execution_type: ExecutionType,
    pub requires_pane: bool,
    pub requires_worktree: bool,
    /// The only auto-transitioning edge is queue -> plan: `soba:queued` is
    /// simultaneously the queue execution label and the plan trigger, so a
    /// freshly queued issue classifies as plan on the next run.
    pub auto_transition: Option<Phase>,
}

static CATALOG: [PhaseDef; 6] = [
    PhaseDef {
        phase: Phase::Queue,
        trigger: LABEL_TODO,
        execution: LABEL_QUEUED,
        completions: &[],
        execution_type: ExecutionType::LabelOnly,
        requires_pane: false,
        requires_worktree: false,
        auto_transition: Some(Phase::Plan),
    },
    PhaseDef {
        phase: Phase::Plan,
        trigger: LABEL_QUEUED,
        execution: LABEL_PLANNING,
        completions: &[CompletionRule {
            label: LABEL_READY,
            next_phase: Phase::Implement,
            remove_label: true,
        }],
        execution_type: ExecutionType::Command,
        requires_pane: true,
        requires_worktree: true,
        auto_transition: None,
    },
    PhaseDef {
        phase: Phase::Implement,
        trigger: LABEL_READY,
        execution: LABEL_DOING,
        completions: &[CompletionRule {
            label: LABEL_REVIEW_REQUESTED,
            next_phase: Phase::Review,
            remove_label: true,
        }],
        execution_type: ExecutionType::Command,
        requires_pane: true,
        requires_worktree: true,
        auto_transition: None,
    },
    PhaseDef {
        phase: Phase::Review,
        trigger: LABEL_REVIEW_REQUESTED,
        execution: LABEL_REVIEWING,
        completions: &[
            CompletionRule {
                label: LABEL_DONE,
                next_phase: Phase::Merge,
                remove_label: true,
            },
            CompletionRule {
                label: LABEL_REQUIRES_CHANGES,
                next_phase: Phase::Revise,
                remove_label: true,
            },
        ],
        execution_type: ExecutionType::Command,
        requires_pane: true,
        requires_worktree: false,
        auto_transition: None,
    },
    PhaseDef {
        phase: Phase::Revise,
        trigger: LABEL_REQUIRES_CHANGES,
        execution: LABEL_REVISING,
        completions: &[CompletionRule {
            label: LABEL_REVIEW_REQUESTED,
            next_phase: Phase::Review,
            remove_label: true,
        }],
        execution_type: ExecutionType::Command,
        requires_pane: true,
        requires_worktree: true,
        auto_transition: None,
    },
    PhaseDef {
        phase: Phase::Merge,
        trigger: LABEL_DONE,
        execution: LABEL_MERGED,
        completions: &[],
        execution_type: ExecutionType::LabelOnly,
        requires_pane: false,
        requires_worktree: false,
        auto_transition: None,
    },
];

/// True for any label in the reserved namespace, including the LGTM label.
pub fn is_reserved(label: &str) -> bool {
    label.starts_with(LABEL_PREFIX)
}

/// `soba:merged` ends the lifecycle; the in-flight token is cleared on it.
pub fn is_terminal(label: &str) -> bool {
    label == LABEL_MERGED
}

pub fn phase_by_trigger(label: &str) -> Option<&'static PhaseDef> {
    CATALOG.iter().find(|def| def.trigger == label)
}

pub fn phase_by_execution(label: &str) -> Option<&'static PhaseDef> {
    CATALOG.iter().find(|def| def.execution == label)
}

pub fn is_completion(label: &str) -> bool {
    CATALOG.iter().any(|def| def.completions.iter().any(|c| c.label == label))
}

/// Next action when `completion_label` appears on an issue whose phase is
/// identified by `execution_label`.
pub fn next_action(execution_label: &str, completion_label: &str) -> Option<NextAction> {
    let def = phase_by_execution(execution_label)?;
    def.completions
        .iter()
        .find(|c| c.label == completion_label)
        .map(|c| NextAction {
            remove_label: c.remove_label,
            next_phase: c.next_phase,
        })
}
