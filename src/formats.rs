use serde::{Deserialize, Serialize};

/// One extracted catalog entry, stored as `<id>.json` in the output
/// directory. Serialized field names match the stored payload format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    pub stars: f32,
    pub category: String,
    /// `None` when no inline script carried the name marker; the literal
    /// `"N/A"` when a marker block existed but held nothing version-shaped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
}
