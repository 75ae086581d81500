//! JSON directory listing served for directory paths.
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::AppState;
use crate::chunk::Entry;
use crate::error::{FilerError, FilerResult};

pub const DEFAULT_LIST_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<Entry>,
    pub limit: u32,
    pub last_file_name: String,
    pub should_display_load_more: bool,
}

/// Lists `path`, honouring the `limit` and `lastFileName` query parameters.
pub async fn list_directory(state: &AppState, path: &str, query: &str) -> FilerResult<Response> {
    if state.option.disable_dir_listing {
        return Err(FilerError::DirListingDisabled);
    }

    let mut limit = DEFAULT_LIST_LIMIT;
    let mut last_file_name = String::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        match k.as_ref() {
            "limit" => limit = v.parse::<u32>().ok().filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT),
            "lastFileName" => last_file_name = v.into_owned(),
            _ => {}
        }
    }
    let limit = limit.min(state.option.dir_listing_limit.max(1));

    let entries = match state.meta.list_entries(path, &last_file_name, limit).await {
        Ok(entries) => entries,
        // A missing root is an empty namespace, not an error.
        Err(FilerError::NotFound(_)) if path == "/" => Vec::new(),
        Err(e) => return Err(e),
    };
    let should_display_load_more = entries.len() as u32 == limit;
    if let Some(last) = entries.last() {
        last_file_name = last.name().to_string();
    }
    tracing::debug!("listed {} entries under {}", entries.len(), path);

    Ok(Json(DirectoryListing {
        path: path.to_string(),
        entries,
        limit,
        last_file_name,
        should_display_load_more,
    })
    .into_response())
}
