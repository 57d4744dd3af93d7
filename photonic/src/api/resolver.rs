use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::error::ApiError;
use super::study::StudyRecord;
use crate::auth::PortalClient;

/// Worklist page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// The worklist endpoint answers with either a bare list or a wrapper object.
#[derive(Deserialize)]
#[serde(untagged)]
enum WorklistResponse {
    List(Vec<StudyRecord>),
    Wrapped { study_list: Vec<StudyRecord> },
}

impl From<WorklistResponse> for Vec<StudyRecord> {
    fn from(response: WorklistResponse) -> Self {
        match response {
            WorklistResponse::List(studies) => studies,
            WorklistResponse::Wrapped { study_list } => study_list,
        }
    }
}

#[derive(Deserialize)]
struct StudyDataResponse {
    #[serde(default)]
    study_data: Option<StudyData>,
}

#[derive(Deserialize)]
struct StudyData {
    #[serde(default)]
    study_instance_uuid: Option<String>,
}

/// Map a public study instance UID to the portal's internal archive id.
pub async fn resolve_internal_id(client: &PortalClient, study_uid: &str) -> Result<String, ApiError> {
    let url = client.endpoints().study_data();
    let form = Form::new().text("study_instance_uid", study_uid.to_string());

    let response: StudyDataResponse = post_json(client, &url, form).await?;
    let internal_id = response
        .study_data
        .and_then(|data| data.study_instance_uuid)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Resolution {
            study_uid: study_uid.to_string(),
        })?;

    debug!(study_uid, internal_id = %internal_id, "Resolved study");
    Ok(internal_id)
}

/// Fetch one page of the worklist (1-based `page_num`).
pub async fn fetch_worklist(
    client: &PortalClient,
    page_size: u32,
    page_num: u32,
) -> Result<Vec<StudyRecord>, ApiError> {
    let url = client.endpoints().worklist();
    let form = Form::new()
        .text("page_size", page_size.to_string())
        .text("page_num", page_num.to_string());

    let response: WorklistResponse = post_json(client, &url, form).await?;
    let studies: Vec<StudyRecord> = response.into();
    info!(count = studies.len(), page_num, "Fetched worklist");
    Ok(studies)
}

async fn post_json<T: DeserializeOwned>(
    client: &PortalClient,
    url: &str,
    form: Form,
) -> Result<T, ApiError> {
    let response = client.authenticated_post(url, form).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response.bytes().await.map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
