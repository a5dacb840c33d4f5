use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::crypto::rsa::PublicKey;
use crate::error::{AppError, Result};

/// CAS login URL carrying the portal's service parameter; the session
/// cookies issued here are what the scrape endpoints honor.
const SERVICE_LOGIN_URL: &str =
    "https://zjuam.zju.edu.cn/cas/login?service=http%3A%2F%2Fappservice.zju.edu.cn%2Findex";
/// Bare CAS login URL the credential form is POSTed to.
const CAS_LOGIN_URL: &str = "https://zjuam.zju.edu.cn/cas/login";
/// Endpoint publishing the RSA public key for password encryption.
const PUBKEY_URL: &str = "https://zjuam.zju.edu.cn/cas/v2/getPubKey";

/// Client-level timeout for every outbound portal call.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(15);

/// The literal phrase the CAS page embeds when the credentials are wrong.
const BAD_CREDENTIALS_PHRASE: &str = "用户名或密码错误";

/// Opening marker of the hidden CSRF field on the login page.
const EXECUTION_MARKER: &str = "execution\" value=\"";
/// Closing marker of the hidden CSRF field.
const EXECUTION_END: &str = "\" />";

/// How far a session's login has been corroborated.
///
/// A 200 from the CAS POST without the bad-credentials phrase is only
/// *probable* success; the portal confirms it implicitly when the first
/// scrape response decodes. The two states let decode failures be blamed
/// correctly: on the login while pending, on the upstream afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Login POST accepted but no scrape response has decoded yet.
    PendingVerification,
    /// At least one scrape response decoded; the login definitely worked.
    Authenticated,
}

/// An authenticated portal session: a cookie-bearing HTTP client plus the
/// corroboration state. Owned by a single request, never shared across
/// tokens, dropped when the request is done.
#[derive(Debug)]
pub struct PortalSession {
    client: reqwest::Client,
    verified: AtomicBool,
}

impl PortalSession {
    pub(crate) fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            verified: AtomicBool::new(false),
        }
    }

    /// The cookie-bearing client the scrape endpoints are called with.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Current corroboration state.
    pub fn login_state(&self) -> LoginState {
        if self.verified.load(Ordering::Acquire) {
            LoginState::Authenticated
        } else {
            LoginState::PendingVerification
        }
    }

    /// Records that a scrape response decoded, corroborating the login.
    pub fn mark_authenticated(&self) {
        self.verified.store(true, Ordering::Release);
    }
}

#[derive(Deserialize)]
struct RawPubKey {
    modulus: String,
    exponent: String,
}

/// Emulates the CAS single-sign-on exchange of the university portal.
///
/// One login is three fixed stages against the live service: fetch the login
/// page and pull the CSRF `execution` token out of it, fetch the RSA public
/// key and encrypt the password with the portal's unpadded scheme, then POST
/// the login form. No stage is retried; every failure is classified for the
/// caller.
pub struct SsoClient {
    service_login_url: String,
    cas_login_url: String,
    pubkey_url: String,
}

impl SsoClient {
    /// A client wired to the production CAS endpoints.
    pub fn new() -> Self {
        Self {
            service_login_url: SERVICE_LOGIN_URL.to_string(),
            cas_login_url: CAS_LOGIN_URL.to_string(),
            pubkey_url: PUBKEY_URL.to_string(),
        }
    }

    /// A client wired to arbitrary endpoints, for tests against a local stub.
    #[cfg(test)]
    pub fn with_urls(service_login_url: String, cas_login_url: String, pubkey_url: String) -> Self {
        Self {
            service_login_url,
            cas_login_url,
            pubkey_url,
        }
    }

    /// Performs the three-stage CAS login.
    ///
    /// # Arguments
    ///
    /// * `username` - The portal username.
    /// * `password` - The cleartext password; it is RSA-encrypted in place of
    ///   ever being sent raw.
    ///
    /// # Returns
    ///
    /// A `Result` containing a [`PortalSession`] in
    /// [`LoginState::PendingVerification`].
    pub async fn login(&self, username: &str, password: &str) -> Result<PortalSession> {
        // The cookie store starts empty: the session must be built entirely
        // by this exchange.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(OUTBOUND_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build portal client: {}", e)))?;

        // Stage 1: login page, CSRF execution token.
        let page = client
            .get(&self.service_login_url)
            .send()
            .await
            .map_err(|e| AppError::Connectivity(format!("can not access login page: {}", e)))?
            .text()
            .await
            .map_err(|e| AppError::Connectivity(format!("can not read login page: {}", e)))?;
        let execution = extract_execution(&page)?;
        debug!("CAS execution token extracted");

        // Stage 2: public key, password encryption.
        let pubkey_body = client
            .get(&self.pubkey_url)
            .send()
            .await
            .map_err(|e| AppError::Connectivity(format!("can not access pubkey: {}", e)))?
            .text()
            .await
            .map_err(|e| AppError::Connectivity(format!("can not read pubkey: {}", e)))?;
        let raw: RawPubKey = sonic_rs::from_str(&pubkey_body)
            .map_err(|e| AppError::Protocol(format!("can not unmarshal pubkey: {}", e)))?;
        let key = PublicKey::from_hex(&raw.modulus, &raw.exponent)?;
        let encrypted = key.encrypt(password)?;

        // Stage 3: the login form itself.
        let form = [
            ("username", username),
            ("password", encrypted.as_str()),
            ("authcode", ""),
            ("execution", execution),
            ("_eventId", "submit"),
        ];
        let response = client
            .post(&self.cas_login_url)
            .form(&form)
            .send()
            .await
            .map_err(|_| {
                AppError::Connectivity(
                    "无法向zjuam提交表单，怀疑是限制内网访问，请过段时间再来~".to_string(),
                )
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Connectivity(format!("can not read login response: {}", e)))?;

        if status != StatusCode::OK {
            return Err(AppError::Authentication(
                "http返回值错误，请检查用户名密码是否正确".to_string(),
            ));
        }
        if body.contains(BAD_CREDENTIALS_PHRASE) {
            return Err(AppError::Authentication(BAD_CREDENTIALS_PHRASE.to_string()));
        }

        // A clean 200 is probable success only; corroboration comes from the
        // first scrape response that decodes.
        debug!("🔐 CAS login accepted, session pending corroboration");
        Ok(PortalSession::new(client))
    }
}

/// Pulls the CSRF `execution` token out of the login page HTML.
///
/// Fails fast with a Protocol error when either marker is missing instead of
/// slicing at unchecked offsets.
fn extract_execution(page: &str) -> Result<&str> {
    let start = page
        .find(EXECUTION_MARKER)
        .ok_or_else(|| {
            AppError::Protocol("login page is missing the execution field".to_string())
        })?
        + EXECUTION_MARKER.len();
    let end = page[start..]
        .find(EXECUTION_END)
        .ok_or_else(|| {
            AppError::Protocol("login page execution field is not terminated".to_string())
        })?
        + start;
    Ok(&page[start..end])
}
