use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};

use grimoire_store::{Store as _, StorePrefix, ValidPath};

use crate::{error::ApiResult, state::AppState};

/// Serves stored cover bytes. The file name comes from the URL, so it goes
/// through `ValidPath` before it may touch the filesystem.
pub async fn download(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let path = ValidPath::new(file)?.with_prefix(StorePrefix::Covers);
    let store = state.store();
    let data = store.load_data(&path).await?;
    let size = store.size(&path).await?;
    let body = Body::from_stream(data);

    let mime = new_mime_guess::from_path(path.as_ref())
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        mime.parse().unwrap(), // safe as MIME is ASCII
    );
    headers.insert(
        header::CONTENT_LENGTH,
        size.to_string().parse().unwrap(), // safe - number is ASCII
    );

    Ok((StatusCode::OK, headers, body))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{file}", get(download))
}
