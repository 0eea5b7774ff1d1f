//! The demand-driven pagination engine (C5, §4.2): turns one
//! `(fname, CrawlNeed)` pair into a classified stream of `Content`,
//! rate-limited by a single shared `EtaSleep`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use forumod_model::content::{Comment, Content, ContentKind, Post, Thread};
use forumod_model::ids::{Fname, Pid, Tid, UserId};
use forumod_model::user::User;
use forumod_model::UpdateStatus;
use tokio::sync::mpsc;

use crate::browser_client::{BrowserClient, BrowserFragment, BrowserUser};
use crate::db::ContentCacheStore;
use crate::rate_limit::EtaSleep;

/// Per-forum boolean triple expressing which content layers the caller
/// wants yielded (§4.2 `CrawlNeed`, GLOSSARY).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlNeed {
    pub thread: bool,
    pub post: bool,
    pub comment: bool,
}

impl CrawlNeed {
    pub fn is_empty(&self) -> bool {
        !self.thread && !self.post && !self.comment
    }

    /// OR-merges `other` into `self` (§4.3 `update_needs` aggregation).
    pub fn union(&mut self, other: CrawlNeed) {
        self.thread |= other.thread;
        self.post |= other.post;
        self.comment |= other.comment;
    }

    /// Layers present in `self` but not in `other` -- "what did this
    /// forum lose" when diffing one need aggregate against the next
    /// (§4.3 "- fname[layers]" change log).
    pub fn difference(&self, other: CrawlNeed) -> CrawlNeed {
        CrawlNeed {
            thread: self.thread && !other.thread,
            post: self.post && !other.post,
            comment: self.comment && !other.comment,
        }
    }

    pub fn wants(&self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Thread => self.thread,
            ContentKind::Post => self.post,
            ContentKind::Comment => self.comment,
        }
    }
}

/// Scan cadence and pagination-window parameters read from
/// `forumod_config::ScanConfig` (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    pub thread_page_forward: u32,
    pub post_page_forward: u32,
    pub post_page_backward: u32,
    pub comment_page_backward: u32,
    pub query_cd: Duration,
    /// Seconds to sleep between complete passes over the need set
    /// (§4.3 `crawl()`).
    pub loop_cd: f64,
}

impl From<&forumod_config::ScanConfig> for ScanParams {
    fn from(cfg: &forumod_config::ScanConfig) -> Self {
        Self {
            thread_page_forward: cfg.thread_page_forward,
            post_page_forward: cfg.post_page_forward,
            post_page_backward: cfg.post_page_backward,
            comment_page_backward: cfg.comment_page_backward,
            query_cd: Duration::from_secs_f64(cfg.query_cd.max(0.0)),
            loop_cd: cfg.loop_cd.max(0.0),
        }
    }
}

/// The forum-scanner. One instance is the process-wide singleton (§3
/// "Spider: singleton"); `rate_limit` is shared by every outbound
/// request it makes.
pub struct Spider {
    browser: BrowserClient,
    cache: Arc<dyn ContentCacheStore>,
    rate_limit: EtaSleep,
}

impl Spider {
    pub fn new(cache: Arc<dyn ContentCacheStore>, query_cd: Duration) -> Self {
        Self {
            browser: BrowserClient::new(),
            cache,
            rate_limit: EtaSleep::new(query_cd),
        }
    }

    /// Reconfigures the shared rate-limit gate's cooldown so a
    /// `query_cd` change from `restart` takes effect on the very next
    /// outbound request, not only on process restart (§4.3, §8 scenario
    /// 6 "subsequent requests observe the new inter-request delay").
    pub fn set_query_cd(&self, query_cd: Duration) {
        self.rate_limit.set_cd(query_cd);
    }

    async fn gated<T>(&self, fut: impl Future<Output = T>) -> T {
        let guard = self.rate_limit.acquire().await;
        let result = fut.await;
        guard.release().await;
        result
    }

    /// Runs one pass over `fname` per `need`/`params`, pushing every
    /// yielded `Content` onto `tx` (§4.2 algorithm). Logged-and-skipped
    /// per-request failures never abort the pass.
    pub async fn scan_pass(
        &self,
        fname: &str,
        need: CrawlNeed,
        params: ScanParams,
        tx: &mpsc::UnboundedSender<Content>,
    ) {
        for pn in 1..=params.thread_page_forward {
            let resp = self.gated(self.browser.get_thread_list(fname, pn)).await;
            let items = match resp {
                Ok(r) => r.thread_list,
                Err(err) => {
                    tracing::warn!(%fname, pn, error = %err, "thread list fetch failed, skipping page");
                    continue;
                }
            };
            for item in items {
                let thread = Content::Thread(Thread {
                    fname: Fname::from(fname),
                    tid: Tid(item.id),
                    title: item.title.clone(),
                    text: join_fragments(&item.first_post_content),
                    images: vec![],
                    create_time: item.last_time_int,
                    last_time: item.last_time_int,
                    reply_num: item.reply_num,
                    user: to_user(&item.author),
                });
                self.observe_thread(fname, thread, need, params, tx).await;
            }
        }
    }

    async fn observe_thread(
        &self,
        fname: &str,
        thread: Content,
        need: CrawlNeed,
        params: ScanParams,
        tx: &mpsc::UnboundedSender<Content>,
    ) {
        let status = match self.cache.classify_and_update(&thread).await {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "classifier failed for thread, dropping from pass");
                return;
            }
        };

        if status.intersects(UpdateStatus::IS_NEW) && need.thread {
            let _ = tx.send(thread.clone());
        }
        if status.intersects(UpdateStatus::IS_STABLE) && !need.post && !need.comment {
            return;
        }

        let tid = thread.tid();
        let first_page = self.gated(self.browser.get_page(tid.0, 1)).await;
        let first_page = match first_page {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(%fname, tid = tid.0, error = %err, "thread detail page 1 fetch failed");
                return;
            }
        };

        let mut pages = vec![first_page];
        let total_page = pages[0].page.total_page.max(1);
        for pn in post_pages_to_fetch(total_page, params.post_page_forward, params.post_page_backward) {
            match self.gated(self.browser.get_page(tid.0, pn)).await {
                Ok(p) => pages.push(p),
                Err(err) => {
                    tracing::warn!(%fname, tid = tid.0, pn, error = %err, "thread detail page fetch failed, skipping");
                }
            }
        }

        for page in pages {
            for post in page.post_list {
                if post.floor == 1 {
                    // redundant with the thread itself
                    continue;
                }
                self.observe_post(fname, tid, &post, need, params, tx).await;
            }
        }
    }

    async fn observe_post(
        &self,
        fname: &str,
        tid: Tid,
        post: &crate::browser_client::BrowserPost,
        need: CrawlNeed,
        params: ScanParams,
        tx: &mpsc::UnboundedSender<Content>,
    ) {
        let content = Content::Post(Post {
            fname: Fname::from(fname),
            tid,
            pid: Pid(post.id),
            title: String::new(),
            text: join_fragments(&post.content),
            images: vec![],
            create_time: post.time,
            reply_num: post.sub_post_number,
            floor: post.floor,
            user: User {
                user_id: UserId(post.author_id),
                user_name: None,
                nick_name: String::new(),
                portrait: String::new(),
                level: 0,
            },
        });

        let status = match self.cache.classify_and_update(&content).await {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "classifier failed for post, dropping from pass");
                return;
            }
        };

        if status.intersects(UpdateStatus::IS_NEW) && need.post {
            let _ = tx.send(content.clone());
        }

        let inline_comments: Vec<&crate::browser_client::BrowserSubPost> = post
            .sub_post_list
            .as_ref()
            .map(|l| l.sub_post_list.iter().collect())
            .unwrap_or_default();

        for sub in &inline_comments {
            self.observe_comment(fname, tid, post.floor, sub, need, tx).await;
        }

        if status.intersects(UpdateStatus::IS_STABLE) || !need.post {
            return;
        }

        let target_pn = (post.sub_post_number as f64 / 30.0).ceil().max(1.0) as u32;
        match self.gated(self.browser.get_comments(tid.0, post.id, target_pn)).await {
            Ok(page) => {
                let subs: Vec<crate::browser_client::BrowserSubPost> = page
                    .post_list
                    .into_iter()
                    .filter_map(|p| p.sub_post_list)
                    .flat_map(|l| l.sub_post_list)
                    .collect();
                for sub in &subs {
                    self.observe_comment(fname, tid, post.floor, sub, need, tx).await;
                }
            }
            Err(err) => {
                tracing::warn!(%fname, pid = post.id, error = %err, "last comment page fetch failed");
            }
        }
    }

    async fn observe_comment(
        &self,
        fname: &str,
        tid: Tid,
        parent_floor: u32,
        sub: &crate::browser_client::BrowserSubPost,
        need: CrawlNeed,
        tx: &mpsc::UnboundedSender<Content>,
    ) {
        let content = Content::Comment(Comment {
            fname: Fname::from(fname),
            tid,
            pid: Pid(sub.id),
            title: String::new(),
            text: join_fragments(&sub.content),
            create_time: sub.time,
            floor: parent_floor,
            user: User {
                user_id: UserId(sub.author_id),
                user_name: None,
                nick_name: String::new(),
                portrait: String::new(),
                level: 0,
            },
        });

        let status = match self.cache.classify_and_update(&content).await {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "classifier failed for comment, dropping from pass");
                return;
            }
        };

        if status.intersects(UpdateStatus::IS_NEW) && need.comment {
            let _ = tx.send(content.clone());
        }
    }
}

fn join_fragments(fragments: &[BrowserFragment]) -> String {
    fragments
        .iter()
        .filter_map(|f| f.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

fn to_user(u: &BrowserUser) -> User {
    User {
        user_id: UserId(u.id),
        user_name: u.name.clone(),
        nick_name: u.name_show.clone(),
        portrait: u.portrait.clone(),
        level: u.level_id.parse().unwrap_or(0),
    }
}

/// The pagination-window computation from §4.2: forward pages
/// `[2..min(forward, total)]` unioned with a descending backward tail
/// when the thread is long enough for the windows not to overlap;
/// otherwise every remaining page exactly once.
fn post_pages_to_fetch(total_page: u32, forward: u32, backward: u32) -> Vec<u32> {
    if total_page <= 1 {
        return vec![];
    }
    if total_page < forward + backward {
        return (2..=total_page).collect();
    }
    let forward_end = forward.min(total_page);
    let mut pages: Vec<u32> = (2..=forward_end).collect();
    let tail_start = total_page.saturating_sub(backward).max(1) + 1;
    let tail: Vec<u32> = (tail_start..=total_page).rev().collect();
    for p in tail {
        if !pages.contains(&p) {
            pages.push(p);
        }
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_need_union_is_commutative_or() {
        let mut a = CrawlNeed { thread: true, post: false, comment: false };
        a.union(CrawlNeed { thread: false, post: true, comment: false });
        assert_eq!(a, CrawlNeed { thread: true, post: true, comment: false });
    }

    #[test]
    fn crawl_need_difference_keeps_only_lost_layers() {
        let before = CrawlNeed { thread: true, post: true, comment: false };
        let after = CrawlNeed { thread: true, post: false, comment: true };
        assert_eq!(
            before.difference(after),
            CrawlNeed { thread: false, post: true, comment: false }
        );
    }

    #[test]
    fn short_thread_visits_every_page_once() {
        let pages = post_pages_to_fetch(4, 3, 3);
        assert_eq!(pages, vec![2, 3, 4]);
    }

    #[test]
    fn long_thread_unions_forward_and_backward_windows() {
        let pages = post_pages_to_fetch(100, 3, 2);
        assert_eq!(pages, vec![2, 3, 100, 99]);
    }

    #[test]
    fn single_page_thread_has_nothing_to_fetch() {
        assert!(post_pages_to_fetch(1, 3, 3).is_empty());
    }
}
