use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Local;
use serde::Deserialize;

use crate::{error::Result, services::calendar, state::AppState};

/// Content type for iCalendar bodies.
const CALENDAR_MIME: &str = "text/calendar; charset=utf-8";

/// The query string every feed endpoint expects.
#[derive(Deserialize, Debug)]
pub struct FeedQuery {
    pub token: String,
}

/// Liveness probe.
pub async fn ping() -> &'static str {
    "pong"
}

/// Handles `GET /sub`: the classes + exams calendar, served inline the way
/// webcal subscribers consume it.
#[axum::debug_handler]
pub async fn sub_calendar(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response> {
    let body = class_exam_feed(&state, &query.token).await?;
    Ok(([(header::CONTENT_TYPE, CALENDAR_MIME)], body).into_response())
}

/// Handles `GET /ical`: the same calendar as `/sub`, shipped as a file
/// download for clients that import rather than subscribe.
#[axum::debug_handler]
pub async fn fetch_calendar(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response> {
    let body = class_exam_feed(&state, &query.token).await?;
    Ok((
        [
            (header::CONTENT_TYPE, CALENDAR_MIME),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"zju-calendar.ics\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// Handles `GET /subScore`: the score calendar, served inline.
#[axum::debug_handler]
pub async fn sub_score_calendar(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response> {
    let body = score_feed(&state, &query.token).await?;
    Ok(([(header::CONTENT_TYPE, CALENDAR_MIME)], body).into_response())
}

/// Handles `GET /score`: the score calendar as a file download.
#[axum::debug_handler]
pub async fn fetch_score_calendar(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Response> {
    let body = score_feed(&state, &query.token).await?;
    Ok((
        [
            (header::CONTENT_TYPE, CALENDAR_MIME),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"zju-score.ics\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// Decodes the token and renders the classes + exams calendar.
async fn class_exam_feed(state: &AppState, token: &str) -> Result<String> {
    let credentials = state.codec.decode(token)?;
    let records = state.feed.class_exam_records(&credentials).await?;
    let calendar = calendar::class_exam_calendar(&state.schedule, &records);
    let body = calendar.to_string();
    tracing::info!("📅 Calendar feed built, {} bytes", body.len());
    Ok(body)
}

/// Decodes the token and renders the score calendar.
async fn score_feed(state: &AppState, token: &str) -> Result<String> {
    let credentials = state.codec.decode(token)?;
    let records = state.feed.score_records(&credentials).await?;
    let calendar = calendar::score_calendar(&records, Local::now().date_naive());
    let body = calendar.to_string();
    tracing::info!("📅 Score feed built, {} bytes", body.len());
    Ok(body)
}
