use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Ballot, Choice, InsertableQuestion, Question};
use crate::voting::{VoteError, VoteOutcome};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/**
 * Persistence for questions, choices and votes
 *
 * Choice vote counts are aggregated on every read, nothing is cached.
 */
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create_question(
        &self,
        question: &InsertableQuestion,
        choices: &[String],
    ) -> Result<Question, sqlx::Error>;

    async fn question(&self, id: i32) -> Result<Option<Question>, sqlx::Error>;

    /**
     * Questions with `publish_time <= now`, newest first
     */
    async fn latest_questions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Question>, sqlx::Error>;

    /**
     * Choices of a question ordered by id, with their current vote counts
     */
    async fn choices(&self, question_id: i32) -> Result<Vec<Choice>, sqlx::Error>;

    /**
     * The choice the user currently has selected for the question, if any
     */
    async fn user_choice(&self, user_id: &str, question_id: i32) -> Result<Option<i32>, sqlx::Error>;

    /**
     * Validate and record a ballot as a single atomic unit.
     *
     * Implementations must guarantee that concurrent first votes by one user
     * on one question leave exactly one vote behind.
     */
    async fn cast_vote(&self, ballot: &Ballot, now: DateTime<Utc>) -> Result<VoteOutcome, VoteError>;
}
