/*!
 * The routes module contains all the tide routes and the logic to fulfill the responses for each
 * route.
 *
 * Modules are nested for cleaner organization here
 */
use serde::{Deserialize, Serialize};
use tide::{Redirect, Request};

use crate::audit;
use crate::auth;
use crate::AppState;

const INDEX_URL: &str = "/polls";

/**
 *  GET /
 */
pub async fn index(_req: Request<AppState>) -> tide::Result {
    Ok(Redirect::new(INDEX_URL).into())
}

/**
 * Parse the `:id` segment, anything that is not a number cannot name a question
 */
fn question_id(req: &Request<AppState>) -> Option<i32> {
    req.param("id").ok().and_then(|id| id.parse::<i32>().ok())
}

fn client_addr(req: &Request<AppState>) -> String {
    /*
     * A proxy chain may send the header on several lines, the original client is on the first
     */
    let forwarded_for = req
        .header("X-Forwarded-For")
        .and_then(|values| values.iter().next())
        .map(|value| value.as_str());
    audit::client_addr(forwarded_for, req.peer_addr())
}

fn redirect_with_notice(req: &mut Request<AppState>, location: &str, notice: &str) -> tide::Result {
    auth::set_notice(req, notice)?;
    Ok(Redirect::new(location).into())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub next: Option<String>,
}

/**
 * Only follow `next` to paths on this site
 */
fn safe_next(next: Option<String>) -> String {
    match next {
        Some(next) if next.starts_with('/') && !next.starts_with("//") => next,
        _ => INDEX_URL.to_string(),
    }
}

pub mod polls {
    use chrono::Utc;
    use log::*;
    use serde::Deserialize;
    use tide::{Redirect, Request};

    use super::{client_addr, question_id, redirect_with_notice, LoginQuery, INDEX_URL};
    use crate::auth;
    use crate::queries;
    use crate::views::{IndexPage, QuestionItem, QuestionPage};
    use crate::voting::VoteError;
    use crate::AppState;

    #[derive(Debug, Default, Deserialize)]
    pub struct VoteForm {
        #[serde(default)]
        pub choice: Option<String>,
    }

    /**
     *  GET /polls
     */
    pub async fn index(mut req: Request<AppState>) -> tide::Result {
        let now = Utc::now();
        let questions = queries::latest_questions(req.state().store.as_ref(), now).await?;

        let page = IndexPage {
            user: auth::current_user(&req),
            notice: auth::take_notice(&mut req),
            questions: questions.iter().map(|q| QuestionItem::new(q, now)).collect(),
        };
        req.state().views.render("index", &page)
    }

    /**
     *  GET /polls/:id
     */
    pub async fn detail(mut req: Request<AppState>) -> tide::Result {
        let now = Utc::now();
        let id = match question_id(&req) {
            Some(id) => id,
            None => return redirect_with_notice(&mut req, INDEX_URL, &VoteError::NotFound.to_string()),
        };
        let user = auth::current_user(&req);

        let detail = queries::voting_detail(req.state().store.as_ref(), id, user.as_deref(), now).await;
        match detail {
            Ok(detail) => {
                let mut page = QuestionPage::new(&detail, user, now);
                page.notice = auth::take_notice(&mut req);
                req.state().views.render("detail", &page)
            }
            Err(VoteError::Store(err)) => Err(err.into()),
            Err(err) => {
                debug!("Question {} is not open for voting: {}", id, err);
                redirect_with_notice(&mut req, INDEX_URL, &err.to_string())
            }
        }
    }

    /**
     *  GET /polls/:id/results
     */
    pub async fn results(mut req: Request<AppState>) -> tide::Result {
        let now = Utc::now();
        let id = match question_id(&req) {
            Some(id) => id,
            None => return redirect_with_notice(&mut req, INDEX_URL, &VoteError::NotFound.to_string()),
        };
        let user = auth::current_user(&req);

        let detail = queries::results_detail(req.state().store.as_ref(), id, user.as_deref(), now).await;
        match detail {
            Ok(detail) => {
                let mut page = QuestionPage::new(&detail, user, now);
                page.notice = auth::take_notice(&mut req);
                req.state().views.render("results", &page)
            }
            Err(VoteError::Store(err)) => Err(err.into()),
            Err(err) => redirect_with_notice(&mut req, INDEX_URL, &err.to_string()),
        }
    }

    /**
     *  POST /polls/:id/vote
     *
     * A body that does not parse as a vote form counts as a missing choice, so the
     * attempt still goes through the voting service and its audit trail
     */
    pub async fn vote(mut req: Request<AppState>) -> tide::Result {
        let form: VoteForm = match req.body_form().await {
            Ok(form) => form,
            Err(err) => {
                debug!("Unreadable vote form: {}", err);
                VoteForm::default()
            }
        };
        let id = question_id(&req);
        let choice_id = form.choice.and_then(|choice| choice.trim().parse::<i32>().ok());
        let user = auth::current_user(&req);
        let client = client_addr(&req);
        let now = Utc::now();

        let result = req
            .state()
            .voting
            .cast_vote(user.as_deref(), id, choice_id, now, &client)
            .await;

        match (result, id) {
            (Ok(outcome), Some(id)) => {
                info!("Vote on question {} by {:?} for {:?}", id, user, outcome.choice_text());
                redirect_with_notice(&mut req, &format!("/polls/{}/results", id), &outcome.message())
            }
            (Err(VoteError::Unauthenticated), id) => {
                let next = match id {
                    Some(id) => format!("/polls/{}", id),
                    None => INDEX_URL.to_string(),
                };
                let query = serde_qs::to_string(&LoginQuery { next: Some(next) })?;
                Ok(Redirect::new(format!("/accounts/login?{}", query)).into())
            }
            (Err(VoteError::InvalidChoice), Some(id)) => {
                /*
                 * Redisplay the voting form. The question may have closed in
                 * the meantime, in which case the regular redirect applies.
                 */
                let detail = queries::voting_detail(req.state().store.as_ref(), id, user.as_deref(), now).await;
                match detail {
                    Ok(detail) => {
                        let mut page = QuestionPage::new(&detail, user, now);
                        page.error = Some(VoteError::InvalidChoice.to_string());
                        req.state().views.render("detail", &page)
                    }
                    Err(VoteError::Store(err)) => Err(err.into()),
                    Err(err) => redirect_with_notice(&mut req, INDEX_URL, &err.to_string()),
                }
            }
            (Err(VoteError::Store(err)), _) => Err(err.into()),
            (Err(err), _) => redirect_with_notice(&mut req, INDEX_URL, &err.to_string()),
            (Ok(_), None) => redirect_with_notice(&mut req, INDEX_URL, &VoteError::NotFound.to_string()),
        }
    }
}

pub mod accounts {
    use log::*;
    use serde::Deserialize;
    use tide::{Redirect, Request};

    use super::{client_addr, safe_next, LoginQuery, INDEX_URL};
    use crate::audit::{AuditAction, AuditEvent};
    use crate::auth;
    use crate::views::LoginPage;
    use crate::AppState;

    const LOGIN_FAILED: &str = "Please enter a correct username and password.";

    #[derive(Debug, Deserialize)]
    pub struct LoginForm {
        #[serde(default)]
        pub username: String,
        #[serde(default)]
        pub password: String,
        #[serde(default)]
        pub next: Option<String>,
    }

    /**
     *  GET /accounts/login
     */
    pub async fn login_form(mut req: Request<AppState>) -> tide::Result {
        let query: LoginQuery = req.query().unwrap_or_default();
        let page = LoginPage {
            user: auth::current_user(&req),
            notice: auth::take_notice(&mut req),
            error: None,
            username: String::new(),
            next: safe_next(query.next),
        };
        req.state().views.render("login", &page)
    }

    /**
     *  POST /accounts/login
     */
    pub async fn login(mut req: Request<AppState>) -> tide::Result {
        let form: LoginForm = req.body_form().await?;
        let client = client_addr(&req);
        let next = safe_next(form.next);

        let authenticated = req.state().identities.authenticate(&form.username, &form.password).await;
        match authenticated {
            Some(user) => {
                auth::log_in(&mut req, &user)?;
                req.state().audit.record(&AuditEvent::new(Some(&user), AuditAction::Login, &client));
                Ok(Redirect::new(next).into())
            }
            None => {
                let attempted = Some(form.username.as_str()).filter(|name| !name.is_empty());
                req.state().audit.record(&AuditEvent::new(attempted, AuditAction::LoginFailed, &client));
                debug!("Rejected login for {:?}", attempted);

                let page = LoginPage {
                    user: None,
                    notice: None,
                    error: Some(LOGIN_FAILED.to_string()),
                    username: form.username.clone(),
                    next,
                };
                req.state().views.render("login", &page)
            }
        }
    }

    /**
     *  GET|POST /accounts/logout
     */
    pub async fn logout(mut req: Request<AppState>) -> tide::Result {
        let user = auth::current_user(&req);
        let client = client_addr(&req);
        auth::log_out(&mut req);
        req.state().audit.record(&AuditEvent::new(user.as_deref(), AuditAction::Logout, &client));
        Ok(Redirect::new(INDEX_URL).into())
    }
}

/**
 * JSON API, handy for scripting and for administrative question creation
 */
pub mod api {
    use chrono::Utc;
    use log::*;
    use tide::{Body, Request, Response, StatusCode};

    use super::question_id;
    use crate::api_models::{ErrorResponse, InsertableQuestion, Tally};
    use crate::auth;
    use crate::queries;
    use crate::voting::VoteError;
    use crate::AppState;

    fn json_error(status: StatusCode, message: &str) -> tide::Result {
        let body = Body::from_json(&ErrorResponse {
            error: message.to_string(),
        })?;
        Ok(Response::builder(status).body(body).build())
    }

    /**
     * Check the `Authorization: Bearer` header against the configured admin token
     */
    fn authorize(req: &Request<AppState>) -> Result<(), StatusCode> {
        let expected = match req.state().admin_token.as_deref() {
            Some(token) => token,
            None => return Err(StatusCode::Forbidden),
        };
        let given = req
            .header("Authorization")
            .map(|values| values.last().as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);

        match given {
            Some(token) if auth::timing_safe_eq(expected, token) => Ok(()),
            _ => Err(StatusCode::Unauthorized),
        }
    }

    /**
     *  GET /api/v1/questions
     */
    pub async fn index(req: Request<AppState>) -> tide::Result {
        let questions = queries::latest_questions(req.state().store.as_ref(), Utc::now()).await?;
        Ok(Body::from_json(&questions)?.into())
    }

    /**
     *  GET /api/v1/questions/:id/results
     */
    pub async fn results(req: Request<AppState>) -> tide::Result {
        let id = match question_id(&req) {
            Some(id) => id,
            None => return json_error(StatusCode::BadRequest, "Invalid question id specified"),
        };
        debug!("Fetching results for question: {}", id);

        let detail = queries::results_detail(req.state().store.as_ref(), id, None, Utc::now()).await;
        match detail {
            Ok(detail) => Ok(Body::from_json(&Tally::new(detail.question, detail.choices))?.into()),
            Err(VoteError::Store(err)) => Err(err.into()),
            Err(err) => json_error(StatusCode::NotFound, &err.to_string()),
        }
    }

    /**
     *  PUT /api/v1/questions
     */
    pub async fn create(mut req: Request<AppState>) -> tide::Result {
        match authorize(&req) {
            Ok(()) => {}
            Err(StatusCode::Forbidden) => return json_error(StatusCode::Forbidden, "Question creation is disabled"),
            Err(status) => return json_error(status, "Invalid admin token"),
        }

        let insertable: InsertableQuestion = req.body_json().await?;
        let choices: Vec<String> = insertable
            .choices
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if insertable.question.text.trim().is_empty() || choices.is_empty() {
            return json_error(StatusCode::BadRequest, "A question needs text and at least one choice");
        }

        let store = req.state().store.as_ref();
        let question = store.create_question(&insertable.question, &choices).await?;
        let choices = store.choices(question.id).await?;
        info!("Created question {}: {:?}", question.id, question.text);

        let body = Body::from_json(&Tally::new(question, choices))?;
        Ok(Response::builder(StatusCode::Created).body(body).build())
    }
}
