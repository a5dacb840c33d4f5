use axum::{extract::State, response::IntoResponse, Form, Json};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::token::Credentials, error::Result, state::AppState,
    validation::setup::validate_credentials,
};

/// The setup form as the static page submits it.
#[derive(Deserialize)]
pub struct SetupRequest {
    pub username: String,
    pub password: String,
}

/// A configured (year, semester) pair shown alongside the links.
#[derive(Serialize)]
pub struct YearAndSemester {
    pub year: String,
    pub semester: String,
}

/// The subscription links handed back once the credentials verify.
#[derive(Serialize)]
pub struct SetupResponse {
    pub classes: Vec<YearAndSemester>,
    pub exams: Vec<YearAndSemester>,
    pub link: String,
    pub sub_link: String,
    pub score_sub_link: String,
}

/// Handles `POST /setup`: verifies the submitted credentials against the
/// portal with a real login plus a scores fetch (which also warms the score
/// cache), then hands back subscription links carrying the sealed token.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - The submitted credential pair.
///
/// # Returns
///
/// The subscription links and the term coverage they will contain.
#[axum::debug_handler]
pub async fn setup(
    State(state): State<AppState>,
    Form(payload): Form<SetupRequest>,
) -> Result<impl IntoResponse> {
    validate_credentials(&payload.username, &payload.password)?;

    let credentials = Credentials {
        username: payload.username,
        password: payload.password,
    };
    let scores = state.feed.probe(&credentials).await?;
    tracing::info!(
        "✅ Setup verified a credential pair, {} score records on file",
        scores.len()
    );

    let token = state
        .codec
        .encode(&credentials.username, &credentials.password)?;
    let host = &state.config.host;

    Ok(Json(SetupResponse {
        classes: state
            .schedule
            .class_terms()
            .iter()
            .map(|item| YearAndSemester {
                year: item.year.clone(),
                semester: item.term.label(),
            })
            .collect(),
        exams: state
            .schedule
            .exam_terms()
            .iter()
            .map(|item| YearAndSemester {
                year: item.year.clone(),
                semester: item.term.label(),
            })
            .collect(),
        link: format!("https://{}/ical?token={}", host, token),
        sub_link: format!("webcal://{}/sub?token={}", host, token),
        score_sub_link: format!("webcal://{}/subScore?token={}", host, token),
    }))
}
