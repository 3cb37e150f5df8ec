use serde::{Deserialize, Serialize};

/**
 * Administrator-provided details to create a Question
 */
#[derive(Debug, Deserialize)]
pub struct InsertableQuestion {
    #[serde(flatten)]
    pub question: crate::models::InsertableQuestion,
    /**
     * Just the text of each choice
     */
    pub choices: Vec<String>,
}

/**
 * Results for a given question
 */
#[derive(Debug, Serialize)]
pub struct Tally {
    pub question: crate::models::Question,
    pub choices: Vec<crate::models::Choice>,
    pub total_votes: i64,
}

impl Tally {
    pub fn new(question: crate::models::Question, choices: Vec<crate::models::Choice>) -> Self {
        let total_votes = choices.iter().map(|c| c.vote_count()).sum();
        Self {
            question,
            choices,
            total_votes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
