//! Operator pages: the sample table and the enrollment form

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use slb_common::{SampleMetadata, TagId};

use super::{escape_html, parse_uid};
use crate::error::ApiResult;
use crate::AppState;

const INDEX_HTML: &str = include_str!("../ui/index.html");

const NO_NEW_SCAN: &str = "No new scan detected.";

/// GET /
pub async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /add - enrollment form for the tag awaiting enrollment
pub async fn add_form(State(state): State<AppState>) -> ApiResult<Response> {
    let Some(uid) = state.consumer.pending().await? else {
        return Ok((StatusCode::BAD_REQUEST, NO_NEW_SCAN).into_response());
    };
    Ok(Html(render_add_form(&uid)).into_response())
}

/// Enrollment form submission
///
/// `uid` names the tag the form was rendered for. Forms without it enroll
/// whatever tag is pending.
#[derive(Debug, Deserialize)]
pub struct AddForm {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(flatten)]
    pub metadata: SampleMetadata,
}

/// POST /add
pub async fn submit_add_form(
    State(state): State<AppState>,
    Form(form): Form<AddForm>,
) -> ApiResult<Response> {
    let target = match form.uid.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_uid(raw)?,
        None => match state.consumer.pending().await? {
            Some(uid) => uid,
            None => return Ok((StatusCode::BAD_REQUEST, NO_NEW_SCAN).into_response()),
        },
    };

    state.consumer.submit_enrollment(&target, form.metadata).await?;
    Ok(Redirect::to("/").into_response())
}

fn render_add_form(uid: &TagId) -> String {
    let fields = [
        ("sample_id", "Sample ID"),
        ("field_number", "Field #"),
        ("project_number", "Project #"),
        ("sampled_by", "Sampled By"),
        ("tested_by", "Tested By"),
        ("tests_run", "Tests Run"),
    ];
    let inputs: String = fields
        .iter()
        .map(|(name, label)| {
            format!(
                r#"<input type="text" name="{}" placeholder="{}" required><br>"#,
                name, label
            )
        })
        .collect();
    let uid = escape_html(uid.as_str());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Add Sample Data</title>
    <style>
        body {{ font-family: Arial, sans-serif; text-align: center; background-color: #f8f9fa; }}
        .container {{ width: 50%; margin: 50px auto 0; background: white; padding: 20px;
                     border-radius: 8px; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1); }}
        input, button {{ padding: 10px; margin: 5px; width: 80%; font-size: 16px; }}
        button {{ background-color: #28a745; color: white; border: none; cursor: pointer; border-radius: 5px; }}
        button:hover {{ background-color: #218838; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Enter Data for {uid}</h2>
        <form method="post" action="/add">
            <input type="hidden" name="uid" value="{uid}">
            {inputs}
            <button type="submit">Load</button>
        </form>
    </div>
</body>
</html>"#,
        uid = uid,
        inputs = inputs
    )
}
