//! Accessor traits over the three content variants (Thread/Post/Comment).
//!
//! Condition templates (C2) and the evaluator (C3) address a piece of
//! content only through these traits, so a rule written against
//! `content_text` or `floor` works identically whichever variant it is
//! evaluated against.

use forumod_model::content::ContentKind;
use forumod_model::ids::{Pid, Tid};
use forumod_model::image::Image;
use forumod_model::user::User;

/// Anything identified by a globally unique content id.
///
/// Separate from [`ContentLike`] so that types which only carry identity
/// (cache rows, confirmation entries) can be keyed the same way content
/// itself is, without pulling in the full accessor surface.
pub trait HasPid {
    fn pid(&self) -> Pid;
}

/// Re-exported so callers of this trait don't need a direct
/// `forumod-model` dependency just to match on it.
pub type ContentKindLike = ContentKind;

/// Field access shared by `Thread`, `Post`, and `Comment`.
///
/// `title` is always the owning thread's title (denormalized on every
/// variant for display); `tid` is always the thread id a piece of content
/// belongs to, including for the thread itself (`tid == pid`).
pub trait ContentLike: HasPid {
    fn fname(&self) -> &str;
    fn tid(&self) -> Tid;
    fn title(&self) -> &str;
    fn text(&self) -> &str;
    fn images(&self) -> &[Image];
    fn create_time(&self) -> i64;
    fn floor(&self) -> u32;
    fn user(&self) -> &User;
    fn kind(&self) -> ContentKind;

    fn is_thread(&self) -> bool {
        self.kind() == ContentKind::Thread
    }
}

impl HasPid for forumod_model::content::Content {
    fn pid(&self) -> Pid {
        forumod_model::content::Content::pid(self)
    }
}

impl ContentLike for forumod_model::content::Content {
    fn fname(&self) -> &str {
        forumod_model::content::Content::fname(self).as_str()
    }
    fn tid(&self) -> Tid {
        forumod_model::content::Content::tid(self)
    }
    fn title(&self) -> &str {
        forumod_model::content::Content::title(self)
    }
    fn text(&self) -> &str {
        forumod_model::content::Content::text(self)
    }
    fn images(&self) -> &[Image] {
        forumod_model::content::Content::images(self)
    }
    fn create_time(&self) -> i64 {
        forumod_model::content::Content::create_time(self)
    }
    fn floor(&self) -> u32 {
        forumod_model::content::Content::floor(self)
    }
    fn user(&self) -> &User {
        forumod_model::content::Content::user(self)
    }
    fn kind(&self) -> ContentKind {
        forumod_model::content::Content::kind(self)
    }
}
