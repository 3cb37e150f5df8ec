use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/**
 * A poll question and the window during which it accepts votes
 */
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Question {
    pub id: i32,
    pub text: String,
    pub publish_time: DateTime<Utc>,
    /**
     * When unset the question stays open for as long as it is published
     */
    pub close_time: Option<DateTime<Utc>>,
}

impl Question {
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        now >= self.publish_time
    }

    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        match self.close_time {
            Some(close_time) => self.publish_time <= now && now <= close_time,
            None => self.publish_time <= now,
        }
    }

    /**
     * Only used to highlight fresh questions in the listing
     */
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.publish_time && self.publish_time <= now
    }
}

/**
 * A question as submitted by an administrator, before it has been stored
 */
#[derive(Clone, Debug, Deserialize)]
pub struct InsertableQuestion {
    pub text: String,
    #[serde(default = "Utc::now")]
    pub publish_time: DateTime<Utc>,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i32,
    pub question_id: i32,
    pub text: String,
    /**
     * Aggregated from the votes table every time the choice is loaded
     */
    pub votes: i64,
}

impl Choice {
    pub fn vote_count(&self) -> i64 {
        self.votes
    }
}

/**
 * question_id is denormalized from the choice so one vote per (user, question) can be enforced directly
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Vote {
    pub id: i32,
    pub user_id: String,
    pub question_id: i32,
    pub choice_id: i32,
}

/**
 * A single user's selection for a question, as submitted through the voting form
 */
#[derive(Clone, Debug)]
pub struct Ballot {
    pub user_id: String,
    pub question_id: i32,
    /**
     * None when the form was submitted without a selection
     */
    pub choice_id: Option<i32>,
}
