//! Sample attachment routes: file list, notes, uploads, downloads

use axum::{
    extract::{Multipart, Path, Request, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use slb_common::TagId;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::{escape_html, parse_uid};
use crate::attachments::SampleAttachments;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AttachmentsResponse {
    pub uid: TagId,
    /// Sample ID from the registry, if the tag is enrolled
    pub sample_id: Option<String>,
    #[serde(flatten)]
    pub attachments: SampleAttachments,
}

#[derive(Debug, Deserialize)]
pub struct NoteForm {
    pub note: String,
}

async fn load(state: &AppState, raw_uid: &str) -> ApiResult<AttachmentsResponse> {
    let uid = parse_uid(raw_uid)?;
    let sample_id = state
        .registry
        .lookup(&uid)
        .await?
        .map(|sample| sample.metadata.sample_id);
    let attachments = state.attachments.list(&uid).await?;
    Ok(AttachmentsResponse {
        uid,
        sample_id,
        attachments,
    })
}

/// GET /api/samples/:uid
pub async fn attachments_json(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<AttachmentsResponse>> {
    Ok(Json(load(&state, &uid).await?))
}

/// GET /samples/:uid
pub async fn sample_page(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Html<String>> {
    Ok(Html(render_sample_page(&load(&state, &uid).await?)))
}

/// POST /samples/:uid/notes
pub async fn add_note(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Form(form): Form<NoteForm>,
) -> ApiResult<Redirect> {
    let uid = parse_uid(&uid)?;
    state.attachments.append_note(&uid, &form.note).await?;
    Ok(Redirect::to(&format!("/samples/{}", uid)))
}

/// POST /samples/:uid/files (multipart, field `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let uid = parse_uid(&uid)?;
    let mut stored = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        state.attachments.save_file(&uid, &file_name, &contents).await?;
        stored += 1;
    }

    if stored == 0 {
        return Err(ApiError::BadRequest("no file in upload".to_string()));
    }
    Ok(Redirect::to(&format!("/samples/{}", uid)))
}

/// GET /samples/:uid/files/:name
pub async fn download_file(
    State(state): State<AppState>,
    Path((uid, name)): Path<(String, String)>,
    request: Request,
) -> ApiResult<Response> {
    let uid = parse_uid(&uid)?;
    let path = state.attachments.file_path(&uid, &name).await?;

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

fn render_sample_page(page: &AttachmentsResponse) -> String {
    let uid = escape_html(page.uid.as_str());
    let title = escape_html(page.sample_id.as_deref().unwrap_or(page.uid.as_str()));

    let files: String = page
        .attachments
        .files
        .iter()
        .map(|name| {
            let name = escape_html(name);
            format!(
                r#"<li><a href="/samples/{uid}/files/{name}" target="_blank">{name}</a></li>"#,
                uid = uid,
                name = name
            )
        })
        .collect();

    let notes = if page.attachments.notes.is_empty() {
        "<p>No notes yet.</p>".to_string()
    } else {
        let items: String = page
            .attachments
            .notes
            .iter()
            .map(|note| format!("<li>{}</li>", escape_html(note)))
            .collect();
        format!("<ul>{}</ul>", items)
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Files for Sample: {title}</title></head>
<body>
    <h2>Files for Sample: {title}</h2>
    <form method="post" action="/samples/{uid}/files" enctype="multipart/form-data">
        <input type="file" name="file" required>
        <button type="submit">Upload File</button>
    </form>
    <h3>Uploaded Files:</h3>
    <ul>{files}</ul>

    <h3>Add Note:</h3>
    <form method="post" action="/samples/{uid}/notes">
        <textarea name="note" rows="4" cols="50" placeholder="Enter your note here..." required></textarea><br>
        <button type="submit">Add Note</button>
    </form>

    <h3>Notes:</h3>
    {notes}

    <br><a href="/">&larr; Back to Table</a>
</body>
</html>"#,
        title = title,
        uid = uid,
        files = files,
        notes = notes
    )
}
