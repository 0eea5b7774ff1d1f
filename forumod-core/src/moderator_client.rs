//! The authenticated moderator-API client (C4, §4.8): wraps a cookie
//! session (`bduss`/`stoken`) and exposes `delete`/`block`/
//! `is_thread_author` over `forumod_contracts::moderator::ModeratorClient`.

use std::sync::RwLock;

use async_trait::async_trait;
use parking_lot::RwLock as PLRwLock;
use serde::Deserialize;

use forumod_contracts::content_like::ContentLike;
use forumod_contracts::error::ContractError;
use forumod_contracts::moderator::{ClientStatus, ModeratorClient};
use forumod_model::ids::Tid;

const BASE_URL: &str = "http://tieba.baidu.com";
const USER_AGENT: &str = "forumod/1.0";

/// The concrete `reqwest`-backed moderator client (§4.8). `status` is a
/// `parking_lot::RwLock` rather than an atomic since `ClientStatus`
/// carries a `String` payload on the `Failed` variant.
pub struct TiebaModeratorClient {
    http: reqwest::Client,
    bduss: Option<String>,
    stoken: Option<String>,
    status: PLRwLock<ClientStatus>,
    self_user_id: RwLock<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct SelfInfoResponse {
    #[serde(default)]
    user_id: u64,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

impl TiebaModeratorClient {
    pub fn new(bduss: Option<String>, stoken: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            bduss,
            stoken,
            status: PLRwLock::new(ClientStatus::MissingCookie),
            self_user_id: RwLock::new(None),
        }
    }

    fn cookie_header(&self) -> Option<String> {
        match (&self.bduss, &self.stoken) {
            (Some(bduss), Some(stoken)) => Some(format!("BDUSS={bduss}; STOKEN={stoken}")),
            _ => None,
        }
    }

    /// `start()` from §4.8: `MISSING_COOKIE` if either credential is
    /// absent, otherwise resolves `SUCCESS`/`FAILED` from
    /// `get_self_info`.
    pub async fn start(&self) -> bool {
        let Some(cookie) = self.cookie_header() else {
            *self.status.write() = ClientStatus::MissingCookie;
            return false;
        };

        match self.get_self_info(&cookie).await {
            Ok(user_id) if user_id != 0 => {
                *self.self_user_id.write().unwrap() = Some(user_id);
                *self.status.write() = ClientStatus::Success;
                true
            }
            Ok(_) => {
                *self.status.write() = ClientStatus::Failed("invalid credentials".into());
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "moderator client failed to start");
                *self.status.write() = ClientStatus::Failed(err.to_string());
                false
            }
        }
    }

    pub fn stop(&self) {
        *self.status.write() = ClientStatus::MissingCookie;
        *self.self_user_id.write().unwrap() = None;
    }

    async fn get_self_info(&self, cookie: &str) -> Result<u64, ContractError> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/mo/q/newmsg"))
            .header("Cookie", cookie)
            .send()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        let parsed: SelfInfoResponse = resp
            .json()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        Ok(parsed.user_id)
    }

    fn require_cookie(&self) -> Result<String, ContractError> {
        self.cookie_header().ok_or(ContractError::MissingAuth)
    }
}

#[async_trait]
impl ModeratorClient for TiebaModeratorClient {
    fn status(&self) -> ClientStatus {
        self.status.read().clone()
    }

    async fn delete(&self, content: &dyn ContentLike) -> Result<bool, ContractError> {
        if content.is_thread() {
            return self.delete_thread(content.fname(), content.tid()).await;
        }

        if !self.status().is_authenticated() {
            return Err(ContractError::MissingAuth);
        }
        let cookie = self.require_cookie()?;
        let fname = content.fname();
        let tid = content.tid();
        let pid = content.pid();

        let form = vec![
            ("fname", fname.to_string()),
            ("tid", tid.0.to_string()),
            ("pid", pid.0.to_string()),
        ];

        let resp = self
            .http
            .post(format!("{BASE_URL}/bawu2/commit/delePost"))
            .header("Cookie", cookie)
            .form(&form)
            .send()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        let body: OperationResponse = resp
            .json()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        if body.error_code != 0 {
            tracing::warn!(code = body.error_code, msg = %body.error_msg, pid = pid.0, "delete failed");
        }
        Ok(body.error_code == 0)
    }

    async fn delete_thread(&self, fname: &str, tid: Tid) -> Result<bool, ContractError> {
        if !self.status().is_authenticated() {
            return Err(ContractError::MissingAuth);
        }
        let cookie = self.require_cookie()?;

        let form = vec![("fname", fname.to_string()), ("tid", tid.0.to_string())];

        let resp = self
            .http
            .post(format!("{BASE_URL}/bawu2/commit/deleteThread"))
            .header("Cookie", cookie)
            .form(&form)
            .send()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        let body: OperationResponse = resp
            .json()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        if body.error_code != 0 {
            tracing::warn!(code = body.error_code, msg = %body.error_msg, tid = tid.0, "thread delete failed");
        }
        Ok(body.error_code == 0)
    }

    async fn block(&self, content: &dyn ContentLike, day: u32, reason: &str) -> Result<bool, ContractError> {
        if !self.status().is_authenticated() {
            return Err(ContractError::MissingAuth);
        }
        let cookie = self.require_cookie()?;
        let fname = content.fname();
        let user_id = content.user().user_id;

        let form = vec![
            ("fname", fname.to_string()),
            ("user_id", user_id.0.to_string()),
            ("day", day.to_string()),
            ("reason", reason.to_string()),
        ];

        let resp = self
            .http
            .post(format!("{BASE_URL}/bawu2/commit/blockUser"))
            .header("Cookie", cookie)
            .form(&form)
            .send()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        let body: OperationResponse = resp
            .json()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        if body.error_code != 0 {
            tracing::warn!(code = body.error_code, msg = %body.error_msg, user_id = user_id.0, "block failed");
        }
        Ok(body.error_code == 0)
    }

    async fn is_thread_author(&self, content: &dyn ContentLike) -> Result<bool, ContractError> {
        if content.is_thread() {
            return Ok(true);
        }
        let cookie = self.require_cookie()?;
        #[derive(Deserialize)]
        struct ThreadInfo {
            #[serde(default)]
            author_id: u64,
        }
        let resp = self
            .http
            .get(format!("{BASE_URL}/mo/q/threadinfo"))
            .header("Cookie", cookie)
            .query(&[("tid", content.tid().0.to_string())])
            .send()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        let info: ThreadInfo = resp
            .json()
            .await
            .map_err(|e| ContractError::OperationFailed { reason: e.to_string() })?;
        Ok(info.author_id == content.user().user_id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_report_missing_cookie() {
        let client = TiebaModeratorClient::new(None, None);
        assert_eq!(client.status(), ClientStatus::MissingCookie);
    }

    #[tokio::test]
    async fn start_without_credentials_returns_false() {
        let client = TiebaModeratorClient::new(None, None);
        assert!(!client.start().await);
        assert_eq!(client.status(), ClientStatus::MissingCookie);
    }
}
