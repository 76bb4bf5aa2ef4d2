//! Context threads: one workflow's messages as an ordered sequence.
//!
//! A thread is a derived view, not separate state. "Did this workflow
//! complete" and "did it follow the expected shape" are properties computed
//! over the assembled sequence.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::message::Message;

/// Messages sharing one `context_id`, ascending by `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextThread {
    context_id: String,
    messages: Vec<Message>,
}

impl ContextThread {
    /// Sort a context's messages by creation time.
    ///
    /// The sort is stable, so messages with equal timestamps keep the order
    /// the store returned them in.
    pub fn assemble(context_id: impl Into<String>, mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.created_at);
        Self {
            context_id: context_id.into(),
            messages,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Message types in thread order.
    pub fn message_types(&self) -> Vec<&str> {
        self.messages
            .iter()
            .map(|m| m.message_type.as_str())
            .collect()
    }

    /// Every agent that sent or received a message in this thread.
    pub fn participants(&self) -> BTreeSet<&str> {
        self.messages
            .iter()
            .flat_map(|m| [m.sender.as_str(), m.recipient.as_str()])
            .collect()
    }

    pub fn latest_of_type(&self, message_type: &str) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.message_type == message_type)
    }

    /// Whether a message of any completion type occurred.
    pub fn is_completed(&self, workflow: &WorkflowConfig) -> bool {
        self.messages
            .iter()
            .any(|m| workflow.completion_types.contains(&m.message_type))
    }

    /// Whether the whole type sequence matches `pattern`.
    pub fn matches(&self, pattern: &WorkflowPattern) -> bool {
        pattern.matches(&self.message_types())
    }

    /// Evaluate the thread against the configured workflow rules.
    pub fn validate(&self, workflow: &WorkflowConfig) -> WorkflowVerdict {
        let last_completion = self
            .messages
            .iter()
            .rposition(|m| workflow.completion_types.contains(&m.message_type));

        let search_from = last_completion.map(|idx| idx + 1).unwrap_or(0);
        let blocked_by = self.messages[search_from..]
            .iter()
            .rev()
            .find(|m| workflow.blocker_types.contains(&m.message_type))
            .cloned();

        let sequence_ok = workflow
            .expected_sequence
            .as_deref()
            .and_then(|text| text.parse::<WorkflowPattern>().ok())
            .map(|pattern| self.matches(&pattern));

        WorkflowVerdict {
            context_id: self.context_id.clone(),
            message_count: self.messages.len(),
            completed: last_completion.is_some(),
            sequence_ok,
            blocked_by,
        }
    }
}

/// Outcome of [`ContextThread::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowVerdict {
    pub context_id: String,
    pub message_count: usize,
    pub completed: bool,
    /// `None` when no expected sequence is configured
    pub sequence_ok: Option<bool>,
    /// Latest blocker/error message not followed by a completion
    pub blocked_by: Option<Message>,
}

/// How many times a workflow step may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Repeat {
    Once,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub message_type: String,
    pub repeat: Repeat,
}

/// Expected message-type sequence for a workflow.
///
/// Parsed from whitespace separated types with optional `?`, `*` or `+`
/// suffixes; arrows between steps are ignored:
///
/// ```
/// use agent_relay::WorkflowPattern;
///
/// let pattern: WorkflowPattern =
///     "TASK_DELEGATION -> TASK_ACCEPTED -> PROGRESS_UPDATE* -> TASK_COMPLETED"
///         .parse()
///         .unwrap();
/// assert!(pattern.matches(&["TASK_DELEGATION", "TASK_ACCEPTED", "TASK_COMPLETED"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPattern {
    steps: Vec<WorkflowStep>,
}

impl WorkflowPattern {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// Whole-sequence match of `types` against the steps.
    pub fn matches<S: AsRef<str>>(&self, types: &[S]) -> bool {
        let m = self.steps.len();
        let n = types.len();

        // table[i][j]: steps[i..] matches types[j..]
        let mut table = vec![vec![false; n + 1]; m + 1];
        table[m][n] = true;

        for i in (0..m).rev() {
            let step = &self.steps[i];
            for j in (0..=n).rev() {
                let here = j < n && types[j].as_ref() == step.message_type;
                table[i][j] = match step.repeat {
                    Repeat::Once => here && table[i + 1][j + 1],
                    Repeat::Optional => table[i + 1][j] || (here && table[i + 1][j + 1]),
                    Repeat::ZeroOrMore => table[i + 1][j] || (here && table[i][j + 1]),
                    Repeat::OneOrMore => here && (table[i + 1][j + 1] || table[i][j + 1]),
                };
            }
        }

        table[0][0]
    }
}

impl FromStr for WorkflowPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut steps = Vec::new();

        for token in s.split_whitespace() {
            if token == "->" || token == "\u{2192}" {
                continue;
            }

            let (name, repeat) = match token.chars().last() {
                Some('?') => (&token[..token.len() - 1], Repeat::Optional),
                Some('*') => (&token[..token.len() - 1], Repeat::ZeroOrMore),
                Some('+') => (&token[..token.len() - 1], Repeat::OneOrMore),
                _ => (token, Repeat::Once),
            };

            if name.is_empty() || name.contains(['?', '*', '+']) {
                return Err(format!("Invalid workflow step: '{}'", token));
            }

            steps.push(WorkflowStep {
                message_type: name.to_string(),
                repeat,
            });
        }

        if steps.is_empty() {
            return Err("Workflow pattern is empty".to_string());
        }

        Ok(Self { steps })
    }
}

impl fmt::Display for WorkflowPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, step) in self.steps.iter().enumerate() {
            if idx > 0 {
                f.write_str(" -> ")?;
            }
            let suffix = match step.repeat {
                Repeat::Once => "",
                Repeat::Optional => "?",
                Repeat::ZeroOrMore => "*",
                Repeat::OneOrMore => "+",
            };
            write!(f, "{}{}", step.message_type, suffix)?;
        }
        Ok(())
    }
}
