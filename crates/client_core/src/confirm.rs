//! Yes/no gate in front of destructive actions.
//!
//! An [`Affirmed`] token can only be minted by a [`ConfirmationGate`] that
//! answered yes, and the destructive operations only accept such a token.

use shared::domain::{CommentId, TaskId};

pub trait ConfirmationGate {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Gate for non-interactive callers that already decided (e.g. `--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl ConfirmationGate for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

pub trait DestructiveAction {
    fn prompt(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteComment {
    pub task_id: TaskId,
    pub comment_id: CommentId,
}

impl DestructiveAction for DeleteComment {
    fn prompt(&self) -> String {
        format!(
            "Delete comment {} from task {}?",
            self.comment_id, self.task_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTask {
    pub task_id: TaskId,
}

impl DestructiveAction for DeleteTask {
    fn prompt(&self) -> String {
        format!("Delete task {}? This cannot be undone.", self.task_id)
    }
}

#[derive(Debug)]
pub struct Affirmed<A> {
    action: A,
}

impl<A: DestructiveAction> Affirmed<A> {
    /// Asks `gate`; `None` means the user declined.
    pub fn request(gate: &impl ConfirmationGate, action: A) -> Option<Self> {
        gate.confirm(&action.prompt()).then_some(Self { action })
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    pub(crate) fn into_action(self) -> A {
        self.action
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn declined_gate_yields_no_token_and_sees_prompt() {
        let seen = RefCell::new(Vec::new());
        let gate = |prompt: &str| {
            seen.borrow_mut().push(prompt.to_string());
            false
        };
        let action = DeleteTask {
            task_id: TaskId::new("t9"),
        };

        assert!(Affirmed::request(&gate, action).is_none());
        assert_eq!(
            seen.into_inner(),
            vec!["Delete task t9? This cannot be undone.".to_string()]
        );
    }

    #[test]
    fn assume_yes_affirms() {
        let action = DeleteComment {
            task_id: TaskId::new("t1"),
            comment_id: CommentId::new("c1"),
        };
        let affirmed = Affirmed::request(&AssumeYes, action.clone()).expect("affirmed");
        assert_eq!(affirmed.action(), &action);
    }
}
