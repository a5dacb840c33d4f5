use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::class::{ClassEntry, RawClassItem};
use crate::models::exam::ExamOutlineEntry;
use crate::models::score::ClassScoreEntry;
use crate::models::term::{ClassTerm, ExamTerm};
use crate::services::sso::{LoginState, PortalSession};

const TIMETABLE_URL: &str =
    "http://appservice.zju.edu.cn/zju-smartcampus/zdydjw/api/kbdy_cxXsZKbxx";
const EXAM_OUTLINE_URL: &str =
    "http://appservice.zju.edu.cn/zju-smartcampus/zdydjw/api/kkqk_cxXsksxx";
const CLASS_SCORE_URL: &str =
    "http://appservice.zju.edu.cn/zju-smartcampus/zdydjw/api/kkqk_cxXscjxx";

/// Surfaced when a response fails to decode before any response has ever
/// decoded on this session: the login itself was probably bad.
const DECODE_FAILURE_PENDING: &str =
    "登录未得到确认，请检查用户名密码是否正确，否则为浙大钉钉服务端问题";

/// The wrapper every portal endpoint answers with. Only `data` is consumed;
/// `code` and `message` are logged for diagnosis and otherwise ignored.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct TimetableData {
    #[serde(rename = "kbList", default)]
    class_list: Vec<RawClassItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ExamOutlineData {
    #[serde(default)]
    list: Vec<ExamOutlineEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoreData {
    #[serde(default)]
    list: Vec<ClassScoreEntry>,
}

/// Client for the portal's three academic-data endpoints.
///
/// Every call POSTs a form through the cookie-bearing client of an
/// established [`PortalSession`] and decodes the JSON envelope. The first
/// successful decode corroborates the session's login; a decode failure is
/// blamed on the login while uncorroborated and on upstream drift afterwards.
pub struct PortalClient {
    timetable_url: String,
    exam_outline_url: String,
    class_score_url: String,
}

impl PortalClient {
    /// A client wired to the production portal endpoints.
    pub fn new() -> Self {
        Self {
            timetable_url: TIMETABLE_URL.to_string(),
            exam_outline_url: EXAM_OUTLINE_URL.to_string(),
            class_score_url: CLASS_SCORE_URL.to_string(),
        }
    }

    /// A client wired to arbitrary endpoints, for tests against a local stub.
    #[cfg(test)]
    pub fn with_urls(timetable_url: String, exam_outline_url: String, class_score_url: String) -> Self {
        Self {
            timetable_url,
            exam_outline_url,
            class_score_url,
        }
    }

    /// Fetches and normalizes the class timetable for one (year, term).
    ///
    /// Rows that fail normalization (blank placeholder slots) are dropped
    /// silently; the surviving rows keep their source order.
    pub async fn class_timetable(
        &self,
        session: &PortalSession,
        year: &str,
        term: ClassTerm,
        stu_id: &str,
    ) -> Result<Vec<ClassEntry>> {
        let form = [("xn", year), ("xq", term.query_value()), ("xh", stu_id)];
        let data: TimetableData = self.post_form(session, &self.timetable_url, &form).await?;
        Ok(data
            .class_list
            .into_iter()
            .filter_map(RawClassItem::normalize)
            .collect())
    }

    /// Fetches the exam outline for one (year, term). Passthrough, no
    /// filtering.
    pub async fn exam_outline(
        &self,
        session: &PortalSession,
        year: &str,
        term: ExamTerm,
        stu_id: &str,
    ) -> Result<Vec<ExamOutlineEntry>> {
        let form = [("xn", year), ("xq", term.query_value()), ("xh", stu_id)];
        let data: ExamOutlineData = self.post_form(session, &self.exam_outline_url, &form).await?;
        Ok(data.list)
    }

    /// Fetches all course scores. Passthrough, no filtering.
    pub async fn class_scores(
        &self,
        session: &PortalSession,
        stu_id: &str,
    ) -> Result<Vec<ClassScoreEntry>> {
        let form = [("lx", "0"), ("xh", stu_id), ("xn", ""), ("xq", ""), ("cjd", "")];
        let data: ScoreData = self.post_form(session, &self.class_score_url, &form).await?;
        Ok(data.list)
    }

    async fn post_form<T>(
        &self,
        session: &PortalSession,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let body = session
            .client()
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Connectivity(format!("POST to portal API failed: {}", e)))?
            .text()
            .await
            .map_err(|e| {
                AppError::Connectivity(format!("can not read portal API response: {}", e))
            })?;

        let envelope: Envelope<T> = match sonic_rs::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Err(match session.login_state() {
                    LoginState::PendingVerification => {
                        AppError::Authentication(DECODE_FAILURE_PENDING.to_string())
                    }
                    LoginState::Authenticated => AppError::Protocol(format!(
                        "unmarshal failed after corroborated login: {}",
                        e
                    )),
                });
            }
        };

        // Any decodable envelope proves the session reached the API instead
        // of a login redirect, which is what corroborates the login.
        session.mark_authenticated();
        if !envelope.code.is_empty() && envelope.code != "200" {
            debug!(
                "portal endpoint answered code={} message={}",
                envelope.code, envelope.message
            );
        }

        Ok(envelope.data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Form, Router};

    use super::*;

    type CapturedForm = Arc<Mutex<Option<HashMap<String, String>>>>;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// One stub endpoint that records the submitted form and answers with a
    /// fixed body.
    async fn spawn_endpoint(body: &'static str) -> (String, CapturedForm) {
        let captured: CapturedForm = Arc::default();
        let router = Router::new()
            .route(
                "/api",
                post(
                    move |State(captured): State<CapturedForm>,
                          Form(form): Form<HashMap<String, String>>| async move {
                        *captured.lock().unwrap() = Some(form);
                        body
                    },
                ),
            )
            .with_state(captured.clone());
        let base = spawn(router).await;
        (format!("{base}/api"), captured)
    }

    fn client_for(url: &str) -> PortalClient {
        PortalClient::with_urls(url.to_string(), url.to_string(), url.to_string())
    }

    fn fresh_session() -> PortalSession {
        PortalSession::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn timetable_normalizes_rows_and_corroborates_the_login() {
        let (url, captured) = spawn_endpoint(
            r#"{"code":"200","message":"成功","data":{"kbList":[
                {"kcmc":"操作系统","xqj":"3","skjc":"6-8","skzc":"1-16周","skdd":"曹西-201","jsxm":"王老师"},
                {"xqj":"1"}
            ]}}"#,
        )
        .await;
        let session = fresh_session();

        let entries = client_for(&url)
            .class_timetable(&session, "2024-2025", ClassTerm::Autumn, "3210100000")
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].course_name, "操作系统");
        assert_eq!(session.login_state(), LoginState::Authenticated);

        let form = captured.lock().unwrap().clone().unwrap();
        assert_eq!(form["xn"], "2024-2025");
        assert_eq!(form["xq"], "1|秋");
        assert_eq!(form["xh"], "3210100000");
    }

    #[tokio::test]
    async fn exam_outline_is_passthrough() {
        let (url, captured) = spawn_endpoint(
            r#"{"code":"200","message":"","data":{"list":[
                {"kcmc":"操作系统","qmkssj":"2025年01月15日(14:00-16:00)"},
                {"kcmc":"线性代数"}
            ]}}"#,
        )
        .await;
        let session = fresh_session();

        let outlines = client_for(&url)
            .exam_outline(&session, "2024-2025", ExamTerm::AutumnWinter, "3210100000")
            .await
            .unwrap();

        assert_eq!(outlines.len(), 2);
        assert!(outlines[1].qmkssj.is_none());
        assert_eq!(captured.lock().unwrap().clone().unwrap()["xq"], "1|秋冬");
    }

    #[tokio::test]
    async fn scores_submit_the_fixed_filter_form() {
        let (url, captured) = spawn_endpoint(
            r#"{"code":"200","message":"","data":{"list":[
                {"kcmc":"操作系统","cj":"92","jd":"4.5","xf":"4.0"}
            ]}}"#,
        )
        .await;
        let session = fresh_session();

        let scores = client_for(&url)
            .class_scores(&session, "3210100000")
            .await
            .unwrap();
        assert_eq!(scores.len(), 1);

        let form = captured.lock().unwrap().clone().unwrap();
        assert_eq!(form["lx"], "0");
        assert_eq!(form["xh"], "3210100000");
        assert_eq!(form["xn"], "");
        assert_eq!(form["xq"], "");
        assert_eq!(form["cjd"], "");
    }

    #[tokio::test]
    async fn missing_data_field_decodes_to_an_empty_set() {
        let (url, _captured) = spawn_endpoint(r#"{"code":"200","message":"ok"}"#).await;
        let session = fresh_session();

        let scores = client_for(&url)
            .class_scores(&session, "3210100000")
            .await
            .unwrap();
        assert!(scores.is_empty());
        assert_eq!(session.login_state(), LoginState::Authenticated);
    }

    #[tokio::test]
    async fn decode_failure_on_a_pending_session_blames_the_login() {
        let (url, _captured) = spawn_endpoint("<html>CAS login page</html>").await;
        let session = fresh_session();

        let err = client_for(&url)
            .class_scores(&session, "3210100000")
            .await
            .unwrap_err();
        match err {
            AppError::Authentication(msg) => assert_eq!(msg, DECODE_FAILURE_PENDING),
            other => panic!("expected Authentication, got {other:?}"),
        }
        assert_eq!(session.login_state(), LoginState::PendingVerification);
    }

    #[tokio::test]
    async fn decode_failure_on_a_corroborated_session_blames_upstream() {
        let (url, _captured) = spawn_endpoint("<html>maintenance</html>").await;
        let session = fresh_session();
        session.mark_authenticated();

        let err = client_for(&url)
            .class_scores(&session, "3210100000")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
    }
}
