use async_std::sync::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;

use crate::models::{Ballot, Choice, InsertableQuestion, Question, Vote};
use crate::store::PollStore;
use crate::voting::{self, VoteError, VoteOutcome};

#[derive(Debug, Default)]
struct Tables {
    last_id: i32,
    questions: Vec<Question>,
    /**
     * Stored without counts, `votes` is filled in when choices are read
     */
    choices: Vec<Choice>,
    votes: Vec<Vote>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }
}

/**
 * Process-local store used when no database is configured.
 *
 * Everything sits behind one lock, which also makes each vote an atomic unit.
 */
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_question(
        &self,
        question: &InsertableQuestion,
        choices: &[String],
    ) -> Result<Question, sqlx::Error> {
        let mut tables = self.tables.lock().await;

        let created = Question {
            id: tables.next_id(),
            text: question.text.clone(),
            publish_time: question.publish_time,
            close_time: question.close_time,
        };
        tables.questions.push(created.clone());

        for text in choices.iter() {
            let choice = Choice {
                id: tables.next_id(),
                question_id: created.id,
                text: text.clone(),
                votes: 0,
            };
            tables.choices.push(choice);
        }

        debug!("inserted: {:?}", created);
        Ok(created)
    }

    async fn question(&self, id: i32) -> Result<Option<Question>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn latest_questions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Question>, sqlx::Error> {
        let tables = self.tables.lock().await;
        let mut published: Vec<Question> = tables
            .questions
            .iter()
            .filter(|q| q.publish_time <= now)
            .cloned()
            .collect();
        published.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
        published.truncate(limit.max(0) as usize);
        Ok(published)
    }

    async fn choices(&self, question_id: i32) -> Result<Vec<Choice>, sqlx::Error> {
        let tables = self.tables.lock().await;
        let mut choices: Vec<Choice> = tables
            .choices
            .iter()
            .filter(|c| c.question_id == question_id)
            .map(|c| Choice {
                votes: tables.votes.iter().filter(|v| v.choice_id == c.id).count() as i64,
                ..c.clone()
            })
            .collect();
        choices.sort_by_key(|c| c.id);
        Ok(choices)
    }

    async fn user_choice(&self, user_id: &str, question_id: i32) -> Result<Option<i32>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .find(|v| v.user_id == user_id && v.question_id == question_id)
            .map(|v| v.choice_id))
    }

    async fn cast_vote(&self, ballot: &Ballot, now: DateTime<Utc>) -> Result<VoteOutcome, VoteError> {
        let mut tables = self.tables.lock().await;

        let question = tables.questions.iter().find(|q| q.id == ballot.question_id).cloned();
        let question = voting::eligible_question(question, now)?;

        let choice_id = ballot.choice_id.ok_or(VoteError::InvalidChoice)?;
        let choice_text = tables
            .choices
            .iter()
            .find(|c| c.id == choice_id && c.question_id == question.id)
            .map(|c| c.text.clone())
            .ok_or(VoteError::InvalidChoice)?;

        let existing = tables
            .votes
            .iter_mut()
            .find(|v| v.user_id == ballot.user_id && v.question_id == question.id);

        match existing {
            Some(vote) => {
                vote.choice_id = choice_id;
                Ok(VoteOutcome::Changed { choice_text })
            }
            None => {
                let vote = Vote {
                    id: tables.next_id(),
                    user_id: ballot.user_id.clone(),
                    question_id: question.id,
                    choice_id,
                };
                tables.votes.push(vote);
                Ok(VoteOutcome::Recorded { choice_text })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn add(store: &MemoryStore, text: &str, publish_time: DateTime<Utc>) -> Question {
        store
            .create_question(
                &InsertableQuestion {
                    text: text.to_string(),
                    publish_time,
                    close_time: None,
                },
                &[],
            )
            .await
            .expect("Failed to create question")
    }

    #[async_std::test]
    async fn latest_questions_excludes_future_and_orders_newest_first() {
        let store = MemoryStore::default();
        let now = Utc::now();
        let old = add(&store, "Old", now - Duration::days(30)).await;
        add(&store, "Future", now + Duration::days(30)).await;
        let recent = add(&store, "Recent", now - Duration::days(5)).await;

        let latest = store.latest_questions(now, 5).await.unwrap();
        assert_eq!(latest, vec![recent, old]);
    }

    #[async_std::test]
    async fn latest_questions_honours_the_limit() {
        let store = MemoryStore::default();
        let now = Utc::now();
        for day in 1..=7 {
            add(&store, &format!("Question {}", day), now - Duration::days(day)).await;
        }

        let latest = store.latest_questions(now, 5).await.unwrap();
        let texts: Vec<&str> = latest.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["Question 1", "Question 2", "Question 3", "Question 4", "Question 5"]);
    }

    #[async_std::test]
    async fn choices_belong_to_their_question() {
        let store = MemoryStore::default();
        let question = store
            .create_question(
                &InsertableQuestion {
                    text: "Pick".to_string(),
                    publish_time: Utc::now(),
                    close_time: None,
                },
                &["One".to_string(), "Two".to_string()],
            )
            .await
            .unwrap();
        add(&store, "Unrelated", Utc::now()).await;

        let choices = store.choices(question.id).await.unwrap();
        assert_eq!(choices.len(), 2);
        assert!(choices.iter().all(|c| c.question_id == question.id && c.votes == 0));
        assert!(store.question(question.id + 100).await.unwrap().is_none());
    }
}
