//! The canonical content model (§3): `Thread`/`Post`/`Comment`, the
//! update-classifier's output bitflags, and the persisted cache row that
//! backs `classify_and_update` (§4.1).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::ids::{Fname, Pid, Tid};
use crate::image::Image;
use crate::user::User;

/// Which of the three content layers a piece of content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Thread,
    Post,
    Comment,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Thread => "thread",
            ContentKind::Post => "post",
            ContentKind::Comment => "comment",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top-level thread. `pid == tid`; `floor` is always 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub fname: Fname,
    pub tid: Tid,
    pub title: String,
    pub text: String,
    pub images: Vec<Image>,
    pub create_time: i64,
    pub last_time: i64,
    pub reply_num: u32,
    pub user: User,
}

impl Thread {
    pub fn pid(&self) -> Pid {
        self.tid.as_pid()
    }
}

/// A reply within a thread. `floor >= 2` is its position in the thread;
/// `floor == 1` (the thread's own first-floor body) is never constructed
/// as a `Post` by the Spider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub fname: Fname,
    pub tid: Tid,
    pub pid: Pid,
    pub title: String,
    pub text: String,
    pub images: Vec<Image>,
    pub create_time: i64,
    pub reply_num: u32,
    pub floor: u32,
    pub user: User,
}

/// A sub-reply nested under a `Post`. Carries the parent post's floor
/// number, not its own (comments have no floor of their own per §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub fname: Fname,
    pub tid: Tid,
    pub pid: Pid,
    pub title: String,
    pub text: String,
    pub create_time: i64,
    pub floor: u32,
    pub user: User,
}

/// Tagged union of the three content variants, per §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Thread(Thread),
    Post(Post),
    Comment(Comment),
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Thread(_) => ContentKind::Thread,
            Content::Post(_) => ContentKind::Post,
            Content::Comment(_) => ContentKind::Comment,
        }
    }

    pub fn pid(&self) -> Pid {
        match self {
            Content::Thread(t) => t.pid(),
            Content::Post(p) => p.pid,
            Content::Comment(c) => c.pid,
        }
    }

    pub fn tid(&self) -> Tid {
        match self {
            Content::Thread(t) => t.tid,
            Content::Post(p) => p.tid,
            Content::Comment(c) => c.tid,
        }
    }

    pub fn fname(&self) -> &Fname {
        match self {
            Content::Thread(t) => &t.fname,
            Content::Post(p) => &p.fname,
            Content::Comment(c) => &c.fname,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Content::Thread(t) => &t.title,
            Content::Post(p) => &p.title,
            Content::Comment(c) => &c.title,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Content::Thread(t) => &t.text,
            Content::Post(p) => &p.text,
            Content::Comment(c) => &c.text,
        }
    }

    pub fn images(&self) -> &[Image] {
        match self {
            Content::Thread(t) => &t.images,
            Content::Post(p) => &p.images,
            Content::Comment(_) => &[],
        }
    }

    pub fn create_time(&self) -> i64 {
        match self {
            Content::Thread(t) => t.create_time,
            Content::Post(p) => p.create_time,
            Content::Comment(c) => c.create_time,
        }
    }

    pub fn floor(&self) -> u32 {
        match self {
            Content::Thread(_) => 1,
            Content::Post(p) => p.floor,
            Content::Comment(c) => c.floor,
        }
    }

    pub fn reply_num(&self) -> Option<u32> {
        match self {
            Content::Thread(t) => Some(t.reply_num),
            Content::Post(p) => Some(p.reply_num),
            Content::Comment(_) => None,
        }
    }

    pub fn last_time(&self) -> Option<i64> {
        match self {
            Content::Thread(t) => Some(t.last_time),
            _ => None,
        }
    }

    pub fn user(&self) -> &User {
        match self {
            Content::Thread(t) => &t.user,
            Content::Post(p) => &p.user,
            Content::Comment(c) => &c.user,
        }
    }
}

bitflags! {
    /// The classifier's output (§4.1). Atoms are the four mutually
    /// exclusive classifications the cache check can produce; the
    /// derived groups are convenience unions the Spider and callers test
    /// against with `contains`/`intersects`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateStatus: u8 {
        const NEW_WITH_CHILD = 0b0001;
        const NEW            = 0b0010;
        const UPDATED        = 0b0100;
        const UNCHANGED      = 0b1000;

        /// `NEW | NEW_WITH_CHILD`.
        const IS_NEW     = Self::NEW.bits() | Self::NEW_WITH_CHILD.bits();
        /// `UNCHANGED | NEW`.
        const IS_STABLE  = Self::UNCHANGED.bits() | Self::NEW.bits();
        /// `UPDATED | NEW_WITH_CHILD`.
        const HAS_CHANGES = Self::UPDATED.bits() | Self::NEW_WITH_CHILD.bits();
    }
}

/// The persisted row backing `classify_and_update` (§3, `content` table
/// in §6). `last_time`/`reply_num` are the update markers compared on
/// repeat sightings; `last_update` is the wall-clock write time used by
/// the TTL sweeper (`PID_CACHE_EXPIRE`, default 7 days).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ContentCacheRecord {
    pub pid: Pid,
    pub tid: Tid,
    pub fname: Fname,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    pub kind: ContentKindColumn,
    pub create_time: i64,
    pub floor: i32,
    pub title: String,
    pub text: String,
    pub images: serde_json::Value,
    pub author_id: i64,
    pub last_time: Option<i64>,
    pub reply_num: Option<i32>,
    pub last_update: i64,
}

/// `ContentKind` stored as its string tag; a thin wrapper so the sqlx
/// `FromRow` derive can decode the `type` column directly without a
/// manual `TryFrom` at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentKindColumn(pub ContentKind);

impl From<ContentKind> for ContentKindColumn {
    fn from(k: ContentKind) -> Self {
        ContentKindColumn(k)
    }
}

impl From<ContentKindColumn> for ContentKind {
    fn from(c: ContentKindColumn) -> Self {
        c.0
    }
}

#[cfg(feature = "sqlx")]
mod sqlx_impls {
    use super::ContentKindColumn;
    use crate::content::ContentKind;
    use sqlx::{Database, Decode, Encode, Type};

    impl<DB: Database> Type<DB> for ContentKindColumn
    where
        String: Type<DB>,
    {
        fn type_info() -> DB::TypeInfo {
            <String as Type<DB>>::type_info()
        }
    }

    impl<'q, DB: Database> Encode<'q, DB> for ContentKindColumn
    where
        String: Encode<'q, DB>,
    {
        fn encode_by_ref(
            &self,
            buf: &mut <DB as Database>::ArgumentBuffer<'q>,
        ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
            self.0.as_str().to_owned().encode_by_ref(buf)
        }
    }

    impl<'r, DB: Database> Decode<'r, DB> for ContentKindColumn
    where
        String: Decode<'r, DB>,
    {
        fn decode(
            value: <DB as Database>::ValueRef<'r>,
        ) -> Result<Self, sqlx::error::BoxDynError> {
            let raw = String::decode(value)?;
            let kind = match raw.as_str() {
                "thread" => ContentKind::Thread,
                "post" => ContentKind::Post,
                "comment" => ContentKind::Comment,
                other => return Err(format!("unknown content type {other:?}").into()),
            };
            Ok(ContentKindColumn(kind))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_new_covers_both_new_atoms() {
        assert!(UpdateStatus::NEW.intersects(UpdateStatus::IS_NEW));
        assert!(UpdateStatus::NEW_WITH_CHILD.intersects(UpdateStatus::IS_NEW));
        assert!(!UpdateStatus::UPDATED.intersects(UpdateStatus::IS_NEW));
    }

    #[test]
    fn is_stable_covers_unchanged_and_new() {
        assert!(UpdateStatus::UNCHANGED.intersects(UpdateStatus::IS_STABLE));
        assert!(UpdateStatus::NEW.intersects(UpdateStatus::IS_STABLE));
        assert!(!UpdateStatus::UPDATED.intersects(UpdateStatus::IS_STABLE));
    }
}
