//! HTTP request/response DTOs shared by the router and the HTTP client (serde ready).
//! Documents themselves travel as `domain` types; only envelopes live here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateExerciseIn {
    #[serde(rename = "activityId")]
    pub activity_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkOut {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignIn {
    #[serde(rename = "milestoneTrackerId")]
    pub milestone_tracker_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadIn {
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "dataBase64")]
    pub data_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssetOut {
    #[serde(rename = "assetId")]
    pub asset_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DescribeOut {
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnhanceIn {
    pub keyword: String,
    #[serde(rename = "contextId")]
    pub context_id: String,
    #[serde(rename = "currentText")]
    pub current_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextOut {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub ok: bool,
    pub openai: bool,
    pub exercises: usize,
    pub responses: usize,
}

/// Error body: `error` is a stable machine code, `message` is for humans.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
    pub message: String,
}
