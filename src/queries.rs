/*!
 * Read side of the polls: the index listing, the voting form and the results
 */
use chrono::{DateTime, Utc};

use crate::models::{Choice, Question};
use crate::store::PollStore;
use crate::voting::VoteError;

pub const INDEX_SIZE: i64 = 5;

/**
 * A question together with its choices and the caller's current selection
 */
#[derive(Clone, Debug)]
pub struct QuestionDetail {
    pub question: Question,
    pub choices: Vec<Choice>,
    pub user_choice: Option<i32>,
}

pub async fn latest_questions(store: &dyn PollStore, now: DateTime<Utc>) -> Result<Vec<Question>, sqlx::Error> {
    store.latest_questions(now, INDEX_SIZE).await
}

/**
 * Load a question for the voting form.
 *
 * Unpublished questions are reported exactly like missing ones so their
 * existence does not leak, closed questions as `VotingClosed`.
 */
pub async fn voting_detail(
    store: &dyn PollStore,
    question_id: i32,
    user: Option<&str>,
    now: DateTime<Utc>,
) -> Result<QuestionDetail, VoteError> {
    let question = store
        .question(question_id)
        .await?
        .filter(|q| q.publish_time <= now)
        .ok_or(VoteError::NotFound)?;

    if !question.can_vote(now) {
        return Err(VoteError::VotingClosed);
    }

    detail(store, question, user).await
}

/**
 * Load a question for the results page, which stays readable after voting closes
 */
pub async fn results_detail(
    store: &dyn PollStore,
    question_id: i32,
    user: Option<&str>,
    now: DateTime<Utc>,
) -> Result<QuestionDetail, VoteError> {
    let question = store
        .question(question_id)
        .await?
        .filter(|q| q.is_published(now))
        .ok_or(VoteError::NotFound)?;

    detail(store, question, user).await
}

async fn detail(store: &dyn PollStore, question: Question, user: Option<&str>) -> Result<QuestionDetail, VoteError> {
    let choices = store.choices(question.id).await?;
    let user_choice = match user {
        Some(user) => store.user_choice(user, question.id).await?,
        None => None,
    };
    Ok(QuestionDetail {
        question,
        choices,
        user_choice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ballot, InsertableQuestion};
    use crate::store::MemoryStore;
    use chrono::Duration;

    async fn add(store: &MemoryStore, publish: Duration, close: Option<Duration>) -> Question {
        let now = Utc::now();
        store
            .create_question(
                &InsertableQuestion {
                    text: "Tabs or spaces?".to_string(),
                    publish_time: now + publish,
                    close_time: close.map(|c| now + c),
                },
                &["Tabs".to_string(), "Spaces".to_string()],
            )
            .await
            .expect("Failed to create question")
    }

    #[async_std::test]
    async fn detail_of_future_question_is_not_found() {
        let store = MemoryStore::default();
        let question = add(&store, Duration::days(5), None).await;
        let err = voting_detail(&store, question.id, None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, VoteError::NotFound));
    }

    #[async_std::test]
    async fn detail_of_closed_question_is_closed() {
        let store = MemoryStore::default();
        let question = add(&store, -Duration::days(2), Some(-Duration::days(1))).await;
        let err = voting_detail(&store, question.id, None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, VoteError::VotingClosed));

        let results = results_detail(&store, question.id, None, Utc::now()).await.expect("Results hidden");
        assert_eq!(results.choices.len(), 2);
    }

    #[async_std::test]
    async fn detail_includes_the_users_choice() {
        let store = MemoryStore::default();
        let question = add(&store, -Duration::days(1), None).await;
        let choices = store.choices(question.id).await.unwrap();
        store
            .cast_vote(
                &Ballot {
                    user_id: "alice".to_string(),
                    question_id: question.id,
                    choice_id: Some(choices[1].id),
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let detail = voting_detail(&store, question.id, Some("alice"), Utc::now()).await.unwrap();
        assert_eq!(detail.user_choice, Some(choices[1].id));
        let detail = voting_detail(&store, question.id, Some("bob"), Utc::now()).await.unwrap();
        assert_eq!(detail.user_choice, None);
    }

    #[async_std::test]
    async fn results_of_future_question_are_hidden() {
        let store = MemoryStore::default();
        let question = add(&store, Duration::days(1), None).await;
        let err = results_detail(&store, question.id, None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, VoteError::NotFound));
    }
}
