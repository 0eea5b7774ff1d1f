//! Image references attached to content (§3). Stored as a JSON array in
//! the `content.images` column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub hash: String,
    pub width: u32,
    pub height: u32,
    pub src: String,
}
