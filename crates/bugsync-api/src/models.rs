// Wire models for the bug endpoint.
//
// Field names follow the server's JSON exactly (`_id`, camelCase for the
// attachment fields). Everything except the title is optional on the wire
// so a sparse push payload still decodes.

use serde::{Deserialize, Serialize};

/// A bug report as the server sends and accepts it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugDto {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i64,
    /// Pending-mutation status code. The server always stores `0`.
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub photo_path: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl BugDto {
    /// Copy of this record without its identifier, as sent on create.
    pub fn without_id(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }
}
