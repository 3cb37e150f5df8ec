use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;

use crate::audit::{AuditAction, AuditEvent, AuditLog};
use crate::models::{Ballot, Question};
use crate::store::PollStore;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("That poll is not available.")]
    NotFound,
    #[error("Voting on this question is currently not allowed.")]
    VotingClosed,
    #[error("You didn't select a choice.")]
    InvalidChoice,
    #[error("You must be logged in to vote.")]
    Unauthenticated,
    #[error("Failed to access the poll store: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub enum VoteOutcome {
    Recorded { choice_text: String },
    Changed { choice_text: String },
}

impl VoteOutcome {
    pub fn choice_text(&self) -> &str {
        match self {
            VoteOutcome::Recorded { choice_text } | VoteOutcome::Changed { choice_text } => choice_text,
        }
    }

    pub fn message(&self) -> String {
        match self {
            VoteOutcome::Recorded { choice_text } => format!("Your vote for '{}' has been recorded.", choice_text),
            VoteOutcome::Changed { choice_text } => format!("Your vote for '{}' has been changed.", choice_text),
        }
    }
}

/**
 * The first two eligibility checks of casting a vote: the question has to exist and be open.
 *
 * Stores call this from inside their atomic unit so the check and the write see the same data.
 */
pub fn eligible_question(question: Option<Question>, now: DateTime<Utc>) -> Result<Question, VoteError> {
    let question = question.ok_or(VoteError::NotFound)?;
    if !question.can_vote(now) {
        return Err(VoteError::VotingClosed);
    }
    Ok(question)
}

/**
 * Records votes and reports every attempt to the audit log
 */
#[derive(Clone)]
pub struct VotingService {
    store: Arc<dyn PollStore>,
    audit: Arc<dyn AuditLog>,
}

impl VotingService {
    pub fn new(store: Arc<dyn PollStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    pub async fn cast_vote(
        &self,
        user: Option<&str>,
        question_id: Option<i32>,
        choice_id: Option<i32>,
        now: DateTime<Utc>,
        client: &str,
    ) -> Result<VoteOutcome, VoteError> {
        let result = match (user, question_id) {
            (None, _) => Err(VoteError::Unauthenticated),
            (Some(_), None) => Err(VoteError::NotFound),
            (Some(user), Some(question_id)) => {
                let ballot = Ballot {
                    user_id: user.to_string(),
                    question_id,
                    choice_id,
                };
                debug!("Ballot received: {:?}", ballot);
                self.store.cast_vote(&ballot, now).await
            }
        };

        if let Err(VoteError::Store(err)) = &result {
            error!("Failed to record vote on question {:?}: {:?}", question_id, err);
        }

        self.audit.record(&AuditEvent::new(
            user,
            AuditAction::Vote {
                question_id,
                choice_id,
                outcome: match &result {
                    Ok(VoteOutcome::Recorded { .. }) => "recorded".to_string(),
                    Ok(VoteOutcome::Changed { .. }) => "changed".to_string(),
                    Err(err) => failure_reason(err).to_string(),
                },
            },
            client,
        ));

        result
    }
}

fn failure_reason(err: &VoteError) -> &'static str {
    match err {
        VoteError::NotFound => "not_found",
        VoteError::VotingClosed => "voting_closed",
        VoteError::InvalidChoice => "invalid_choice",
        VoteError::Unauthenticated => "unauthenticated",
        VoteError::Store(_) => "store_error",
    }
}
