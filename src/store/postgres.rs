use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::models::{Ballot, Choice, InsertableQuestion, Question};
use crate::store::PollStore;
use crate::voting::{self, VoteError, VoteOutcome};

const CHOICES_WITH_COUNTS: &str = "SELECT c.id, c.question_id, c.text, COUNT(v.id) AS votes
    FROM choices c LEFT JOIN votes v ON v.choice_id = c.id
    WHERE c.question_id = $1
    GROUP BY c.id ORDER BY c.id ASC";

/**
 * PostgreSQL backed store
 */
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /**
     * Create the sqlx connection pool and bring the schema up to date
     */
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| sqlx::Error::Configuration(Box::new(err)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn create_question(
        &self,
        question: &InsertableQuestion,
        choices: &[String],
    ) -> Result<Question, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Question>(
            "INSERT INTO questions (text, publish_time, close_time) VALUES ($1, $2, $3)
             RETURNING id, text, publish_time, close_time",
        )
        .bind(&question.text)
        .bind(question.publish_time)
        .bind(question.close_time)
        .fetch_one(&mut tx)
        .await?;

        for choice in choices.iter() {
            sqlx::query("INSERT INTO choices (question_id, text) VALUES ($1, $2)")
                .bind(created.id)
                .bind(choice)
                .execute(&mut tx)
                .await?;
        }

        tx.commit().await?;
        debug!("inserted: {:?}", created);
        Ok(created)
    }

    async fn question(&self, id: i32) -> Result<Option<Question>, sqlx::Error> {
        sqlx::query_as::<_, Question>("SELECT id, text, publish_time, close_time FROM questions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn latest_questions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Question>, sqlx::Error> {
        sqlx::query_as::<_, Question>(
            "SELECT id, text, publish_time, close_time FROM questions
             WHERE publish_time <= $1 ORDER BY publish_time DESC LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn choices(&self, question_id: i32) -> Result<Vec<Choice>, sqlx::Error> {
        sqlx::query_as::<_, Choice>(CHOICES_WITH_COUNTS)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn user_choice(&self, user_id: &str, question_id: i32) -> Result<Option<i32>, sqlx::Error> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT choice_id FROM votes WHERE user_id = $1 AND question_id = $2")
            .bind(user_id)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(choice_id,)| choice_id))
    }

    async fn cast_vote(&self, ballot: &Ballot, now: DateTime<Utc>) -> Result<VoteOutcome, VoteError> {
        let mut tx = self.pool.begin().await?;

        /*
         * FOR SHARE keeps an administrative edit of the voting window from
         * slipping in between the eligibility check and the write
         */
        let question = sqlx::query_as::<_, Question>(
            "SELECT id, text, publish_time, close_time FROM questions WHERE id = $1 FOR SHARE",
        )
        .bind(ballot.question_id)
        .fetch_optional(&mut tx)
        .await?;
        let question = voting::eligible_question(question, now)?;

        let choice_id = ballot.choice_id.ok_or(VoteError::InvalidChoice)?;
        let choice: Option<(String,)> = sqlx::query_as("SELECT text FROM choices WHERE id = $1 AND question_id = $2")
            .bind(choice_id)
            .bind(question.id)
            .fetch_optional(&mut tx)
            .await?;
        let (choice_text,) = choice.ok_or(VoteError::InvalidChoice)?;

        /*
         * The unique (user_id, question_id) constraint turns racing first votes
         * into an update of the row that won. xmax is zero only for a freshly
         * inserted tuple.
         */
        let (inserted,): (bool,) = sqlx::query_as(
            "INSERT INTO votes (user_id, question_id, choice_id) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, question_id) DO UPDATE SET choice_id = EXCLUDED.choice_id
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(&ballot.user_id)
        .bind(question.id)
        .bind(choice_id)
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;

        if inserted {
            Ok(VoteOutcome::Recorded { choice_text })
        } else {
            Ok(VoteOutcome::Changed { choice_text })
        }
    }
}

/*
 * These run against a live database: `DATABASE_URL=... cargo test -- --ignored`
 */
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PgStore::connect(&url, 5).await.expect("Failed to connect")
    }

    async fn open_question(store: &PgStore) -> (Question, Vec<Choice>) {
        let question = store
            .create_question(
                &InsertableQuestion {
                    text: "Postgres?".to_string(),
                    publish_time: Utc::now() - Duration::days(1),
                    close_time: None,
                },
                &["Yes".to_string(), "No".to_string()],
            )
            .await
            .expect("Failed to create question");
        let choices = store.choices(question.id).await.expect("Failed to load choices");
        (question, choices)
    }

    #[async_std::test]
    #[ignore]
    async fn revote_updates_the_existing_row() {
        let store = store().await;
        let (question, choices) = open_question(&store).await;
        let ballot = |choice: &Choice| Ballot {
            user_id: "pg-revote".to_string(),
            question_id: question.id,
            choice_id: Some(choice.id),
        };

        let first = store.cast_vote(&ballot(&choices[0]), Utc::now()).await.unwrap();
        assert!(matches!(first, VoteOutcome::Recorded { .. }));
        let second = store.cast_vote(&ballot(&choices[1]), Utc::now()).await.unwrap();
        assert!(matches!(second, VoteOutcome::Changed { .. }));

        let counts: Vec<i64> = store.choices(question.id).await.unwrap().iter().map(|c| c.votes).collect();
        assert_eq!(counts, vec![0, 1]);
    }

    #[async_std::test]
    #[ignore]
    async fn racing_first_votes_leave_one_row() {
        let store = store().await;
        let (question, choices) = open_question(&store).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let ballot = Ballot {
                user_id: "pg-race".to_string(),
                question_id: question.id,
                choice_id: Some(choices[i % 2].id),
            };
            handles.push(async_std::task::spawn(async move { store.cast_vote(&ballot, Utc::now()).await }));
        }

        let mut recorded = 0;
        for handle in handles {
            if let Ok(VoteOutcome::Recorded { .. }) = handle.await {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 1);

        let total: i64 = store.choices(question.id).await.unwrap().iter().map(|c| c.votes).sum();
        assert_eq!(total, 1);
    }
}
