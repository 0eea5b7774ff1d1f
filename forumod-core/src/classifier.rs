//! The content-update classifier (C1, §4.1): the pure decision table
//! behind `classify_and_update`, kept separate from its storage round
//! trip (`crate::db::content_repo`) so the classification rule itself is
//! unit-testable without a database.

use forumod_model::content::ContentKind;
use forumod_model::UpdateStatus;

/// The prior cache row's update markers, if any (`None` means a cache
/// miss — first sighting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriorMarkers {
    pub last_time: Option<i64>,
    pub reply_num: Option<i32>,
}

/// The incoming item's own markers, read off whichever `Content` variant
/// is being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingMarkers {
    pub last_time: Option<i64>,
    pub reply_num: Option<u32>,
}

/// The decision table from §4.1. `prior` is `None` on a cache miss.
pub fn classify(
    kind: ContentKind,
    incoming: IncomingMarkers,
    prior: Option<PriorMarkers>,
) -> UpdateStatus {
    match (kind, prior) {
        (ContentKind::Thread, None) => {
            if incoming.reply_num.unwrap_or(0) > 0 {
                UpdateStatus::NEW_WITH_CHILD
            } else {
                UpdateStatus::NEW
            }
        }
        (ContentKind::Thread, Some(prior)) => {
            if prior.last_time != incoming.last_time
                || prior.reply_num != incoming.reply_num.map(|n| n as i32)
            {
                UpdateStatus::UPDATED
            } else {
                UpdateStatus::UNCHANGED
            }
        }
        (ContentKind::Post, None) => {
            // The server's sub-reply preview cutoff: up to four sub-replies
            // arrive inline with the parent page, so only `>4` implies
            // unseen children.
            if incoming.reply_num.unwrap_or(0) > 4 {
                UpdateStatus::NEW_WITH_CHILD
            } else {
                UpdateStatus::NEW
            }
        }
        (ContentKind::Post, Some(prior)) => {
            if prior.reply_num != incoming.reply_num.map(|n| n as i32) {
                UpdateStatus::UPDATED
            } else {
                UpdateStatus::UNCHANGED
            }
        }
        (ContentKind::Comment, None) => UpdateStatus::NEW,
        (ContentKind::Comment, Some(_)) => UpdateStatus::UNCHANGED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_first_sighting_no_replies_is_new() {
        let status = classify(
            ContentKind::Thread,
            IncomingMarkers {
                last_time: Some(1_700_000_000),
                reply_num: Some(0),
            },
            None,
        );
        assert_eq!(status, UpdateStatus::NEW);
    }

    #[test]
    fn thread_first_sighting_with_replies_is_new_with_child() {
        let status = classify(
            ContentKind::Thread,
            IncomingMarkers {
                last_time: Some(1_700_000_000),
                reply_num: Some(3),
            },
            None,
        );
        assert_eq!(status, UpdateStatus::NEW_WITH_CHILD);
        assert!(status.intersects(UpdateStatus::IS_NEW));
    }

    #[test]
    fn thread_repeat_sighting_unchanged() {
        let status = classify(
            ContentKind::Thread,
            IncomingMarkers {
                last_time: Some(1_700_000_000),
                reply_num: Some(3),
            },
            Some(PriorMarkers {
                last_time: Some(1_700_000_000),
                reply_num: Some(3),
            }),
        );
        assert_eq!(status, UpdateStatus::UNCHANGED);
    }

    #[test]
    fn thread_repeat_sighting_updated_on_marker_change() {
        let status = classify(
            ContentKind::Thread,
            IncomingMarkers {
                last_time: Some(1_700_000_500),
                reply_num: Some(4),
            },
            Some(PriorMarkers {
                last_time: Some(1_700_000_000),
                reply_num: Some(3),
            }),
        );
        assert_eq!(status, UpdateStatus::UPDATED);
    }

    #[test]
    fn post_first_sighting_threshold_boundary() {
        for n in 0..=4u32 {
            let status = classify(
                ContentKind::Post,
                IncomingMarkers {
                    last_time: None,
                    reply_num: Some(n),
                },
                None,
            );
            assert_eq!(status, UpdateStatus::NEW, "reply_num={n}");
        }
        let status = classify(
            ContentKind::Post,
            IncomingMarkers {
                last_time: None,
                reply_num: Some(5),
            },
            None,
        );
        assert_eq!(status, UpdateStatus::NEW_WITH_CHILD);
    }

    #[test]
    fn post_repeat_sighting_tracks_reply_num_only() {
        let status = classify(
            ContentKind::Post,
            IncomingMarkers {
                last_time: None,
                reply_num: Some(6),
            },
            Some(PriorMarkers {
                last_time: None,
                reply_num: Some(5),
            }),
        );
        assert_eq!(status, UpdateStatus::UPDATED);
    }

    #[test]
    fn comment_is_new_once_then_unchanged_forever() {
        let first = classify(
            ContentKind::Comment,
            IncomingMarkers {
                last_time: None,
                reply_num: None,
            },
            None,
        );
        assert_eq!(first, UpdateStatus::NEW);

        let second = classify(
            ContentKind::Comment,
            IncomingMarkers {
                last_time: None,
                reply_num: None,
            },
            Some(PriorMarkers::default()),
        );
        assert_eq!(second, UpdateStatus::UNCHANGED);
    }
}
