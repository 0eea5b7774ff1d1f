//! The raw HTTP "browser" client (§6): POSTs to the paginated
//! thread-detail endpoint that yields a thread list page or a post page
//! with inline comment previews. Distinct from [`crate::moderator_client`]
//! — this one needs no cookie session, only a signed form body.

use std::time::{SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};
use serde::Deserialize;

use crate::error::{CoreError, Result};

const PAGE_URL: &str = "http://c.tieba.baidu.com/c/f/pb/page";
const THREAD_LIST_URL: &str = "http://c.tieba.baidu.com/c/f/frs/page";
const SIGN_SALT: &str = "tiebaclient!!!";
const CUID: &str = "forumod-crawler";

#[derive(Debug, Deserialize, Default)]
pub struct BrowserUser {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_show: String,
    #[serde(default)]
    pub portrait: String,
    #[serde(default)]
    pub level_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserPost {
    pub id: u64,
    pub tid: u64,
    #[serde(default)]
    pub floor: u32,
    #[serde(default)]
    pub content: Vec<BrowserFragment>,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub sub_post_number: u32,
    #[serde(default)]
    pub author_id: u64,
    #[serde(default)]
    pub sub_post_list: Option<BrowserSubPostList>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserSubPostList {
    #[serde(default)]
    pub sub_post_list: Vec<BrowserSubPost>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserSubPost {
    pub id: u64,
    #[serde(default)]
    pub content: Vec<BrowserFragment>,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub author_id: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserFragment {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserThread {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub id: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserForum {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserPage {
    #[serde(default)]
    pub total_page: u32,
}

/// The page response shape from §6: `{post_list, user_list, page, thread,
/// forum, error_code}`. Only `error_code == 0` is a valid payload.
#[derive(Debug, Deserialize, Default)]
pub struct BrowserPageResponse {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub post_list: Vec<BrowserPost>,
    #[serde(default)]
    pub user_list: Vec<BrowserUser>,
    #[serde(default)]
    pub page: BrowserPage,
    #[serde(default)]
    pub thread: BrowserThread,
    #[serde(default)]
    pub forum: BrowserForum,
}

#[derive(Debug, Deserialize, Default)]
pub struct ThreadListResponse {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub thread_list: Vec<BrowserThreadListItem>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrowserThreadListItem {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_time_int: i64,
    #[serde(default)]
    pub reply_num: u32,
    #[serde(default)]
    pub author: BrowserUser,
    #[serde(default)]
    pub first_post_content: Vec<BrowserFragment>,
}

/// Unauthenticated client for `c.tieba.baidu.com`'s browser-facing
/// pagination endpoints (§6). Every request is signed with
/// `md5(sorted_form_body + "tiebaclient!!!")`.
pub struct BrowserClient {
    http: reqwest::Client,
}

impl Default for BrowserClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent("bdtb for iPhone 12.7.1.0")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn sign(params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        let joined: String = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("");
        let mut hasher = Md5::new();
        hasher.update(joined.as_bytes());
        hasher.update(SIGN_SALT.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn now_ms() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_default()
    }

    /// Fetches one thread-list page for `fname` (§6 `get_threads`).
    pub async fn get_thread_list(&self, fname: &str, pn: u32) -> Result<ThreadListResponse> {
        let mut params = vec![
            ("kw", fname.to_string()),
            ("pn", pn.to_string()),
            ("cuid", CUID.to_string()),
            ("_client_version", "12.7.1.0".to_string()),
            ("timestamp", Self::now_ms()),
        ];
        let sign = Self::sign(&params);
        params.push(("sign", sign));

        let resp = self
            .http
            .post(THREAD_LIST_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        let parsed: ThreadListResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Structural(format!("thread list decode failed: {e}")))?;
        if parsed.error_code != 0 {
            return Err(CoreError::Structural(format!(
                "thread list error_code={}",
                parsed.error_code
            )));
        }
        Ok(parsed)
    }

    /// Fetches one page of a thread's posts, with inline sub-reply
    /// previews (§4.2, §6 the "paginated thread-detail endpoint").
    pub async fn get_page(&self, tid: u64, pn: u32) -> Result<BrowserPageResponse> {
        let mut params = vec![
            ("tid", tid.to_string()),
            ("pn", pn.to_string()),
            ("cuid", CUID.to_string()),
            ("_client_version", "12.7.1.0".to_string()),
            ("timestamp", Self::now_ms()),
        ];
        let sign = Self::sign(&params);
        params.push(("sign", sign));

        let resp = self
            .http
            .post(PAGE_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        let parsed: BrowserPageResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Structural(format!("page decode failed: {e}")))?;
        if parsed.error_code != 0 {
            return Err(CoreError::Structural(format!(
                "page error_code={}",
                parsed.error_code
            )));
        }
        Ok(parsed)
    }

    /// Fetches `target_pn`, the last comment page of a post's
    /// sub-replies (§4.2 "fetch the last comment page
    /// `target_pn = ceil(reply_num / 30)`").
    pub async fn get_comments(&self, tid: u64, pid: u64, pn: u32) -> Result<BrowserPageResponse> {
        let mut params = vec![
            ("tid", tid.to_string()),
            ("pid", pid.to_string()),
            ("pn", pn.to_string()),
            ("cuid", CUID.to_string()),
            ("_client_version", "12.7.1.0".to_string()),
            ("timestamp", Self::now_ms()),
        ];
        let sign = Self::sign(&params);
        params.push(("sign", sign));

        let resp = self
            .http
            .post(PAGE_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        let parsed: BrowserPageResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Structural(format!("comments decode failed: {e}")))?;
        if parsed.error_code != 0 {
            return Err(CoreError::Structural(format!(
                "comments error_code={}",
                parsed.error_code
            )));
        }
        Ok(parsed)
    }
}
