use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use tide::http::mime;
use tide::{Body, Response, StatusCode};

use crate::models::Question;
use crate::queries::QuestionDetail;

/**
 * Handlebars templates for the HTML pages, compiled into the binary
 */
pub struct Views {
    hb: Handlebars<'static>,
}

impl Views {
    pub fn new() -> Result<Self, handlebars::TemplateError> {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(false);
        hb.register_partial("header", include_str!("../templates/header.hbs"))?;
        hb.register_template_string("index", include_str!("../templates/index.hbs"))?;
        hb.register_template_string("detail", include_str!("../templates/detail.hbs"))?;
        hb.register_template_string("results", include_str!("../templates/results.hbs"))?;
        hb.register_template_string("login", include_str!("../templates/login.hbs"))?;
        Ok(Self { hb })
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> tide::Result<Response> {
        let html = self.hb.render(template, data)?;
        Ok(Response::builder(StatusCode::Ok)
            .body(Body::from_string(html))
            .content_type(mime::HTML)
            .build())
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionItem {
    pub id: i32,
    pub text: String,
    pub recent: bool,
}

impl QuestionItem {
    pub fn new(question: &Question, now: DateTime<Utc>) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            recent: question.was_published_recently(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IndexPage {
    pub user: Option<String>,
    pub notice: Option<String>,
    pub questions: Vec<QuestionItem>,
}

#[derive(Debug, Serialize)]
pub struct ChoiceItem {
    pub id: i32,
    pub text: String,
    pub votes: i64,
    pub selected: bool,
}

/**
 * Context for both the voting form and the results page
 */
#[derive(Debug, Serialize)]
pub struct QuestionPage {
    pub user: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub question: QuestionItem,
    pub choices: Vec<ChoiceItem>,
    pub total_votes: i64,
    pub can_vote: bool,
}

impl QuestionPage {
    pub fn new(detail: &QuestionDetail, user: Option<String>, now: DateTime<Utc>) -> Self {
        let choices: Vec<ChoiceItem> = detail
            .choices
            .iter()
            .map(|c| ChoiceItem {
                id: c.id,
                text: c.text.clone(),
                votes: c.vote_count(),
                selected: detail.user_choice == Some(c.id),
            })
            .collect();
        Self {
            user,
            notice: None,
            error: None,
            question: QuestionItem::new(&detail.question, now),
            total_votes: choices.iter().map(|c| c.votes).sum(),
            choices,
            can_vote: detail.question.can_vote(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub user: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub username: String,
    pub next: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Choice;
    use chrono::Duration;

    #[test]
    fn templates_compile() {
        assert!(Views::new().is_ok());
    }

    #[test]
    fn index_lists_questions_or_says_none() {
        let views = Views::new().unwrap();
        let empty = IndexPage {
            user: None,
            notice: None,
            questions: vec![],
        };
        let html = views.hb.render("index", &empty).unwrap();
        assert!(html.contains("No polls are available."));

        let listed = IndexPage {
            user: Some("alice".to_string()),
            notice: Some("Hello <there>".to_string()),
            questions: vec![QuestionItem {
                id: 4,
                text: "Cats or dogs?".to_string(),
                recent: true,
            }],
        };
        let html = views.hb.render("index", &listed).unwrap();
        assert!(html.contains("Cats or dogs?"));
        assert!(html.contains("/polls/4"));
        assert!(html.contains("Hello &lt;there&gt;"));
    }

    #[test]
    fn question_page_marks_the_users_choice() {
        let now = Utc::now();
        let detail = QuestionDetail {
            question: Question {
                id: 1,
                text: "Q".to_string(),
                publish_time: now - Duration::hours(1),
                close_time: None,
            },
            choices: vec![
                Choice {
                    id: 10,
                    question_id: 1,
                    text: "A".to_string(),
                    votes: 3,
                },
                Choice {
                    id: 11,
                    question_id: 1,
                    text: "B".to_string(),
                    votes: 1,
                },
            ],
            user_choice: Some(11),
        };
        let page = QuestionPage::new(&detail, None, now);
        assert!(page.question.recent);
        assert!(page.can_vote);
        assert_eq!(page.total_votes, 4);
        assert_eq!(page.choices.iter().filter(|c| c.selected).map(|c| c.id).collect::<Vec<_>>(), vec![11]);
    }
}
