//! Lifecycle of cover assets. A record owns exactly one stored cover file;
//! every operation here either keeps that invariant or compensates a
//! half-finished transition before returning.

use tokio::task::spawn_blocking;
use tracing::{error, warn};

use grimoire_dal::book::{Book, BookRepository, UpdateBook};
use grimoire_store::{Store as _, StorePrefix, ValidPath, cover_path, error::StoreError};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const COVER_EXT: &str = "webp";

/// Optimizes the spooled upload and stores it as a new cover asset under a
/// freshly generated name. Returns the asset file name. The spooled
/// original is deleted once the optimized copy is durable - best effort
/// only, the asset already exists if that delete fails.
pub async fn store_new_asset(state: &AppState, upload: &ValidPath) -> ApiResult<String> {
    let src = state
        .store()
        .local_path(upload)
        .ok_or_else(|| ApiError::InternalError("Upload is not locally accessible".into()))?;
    let data = spawn_blocking(move || grimoire_image::optimize_cover(src))
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .map_err(|e| ApiError::EncodeError(e.to_string()))?;

    let dest_path = cover_path(COVER_EXT)?;
    let info = state.store().store_data(&dest_path, &data).await?;

    if let Err(e) = state.store().remove(upload).await {
        warn!("Failed to remove uploaded file {:?}: {e}", upload.as_ref());
    }

    // safe due to logic - always stored with this prefix
    let name = info.final_path.without_prefix(StorePrefix::Covers).unwrap();
    Ok(name.into())
}

/// Replaces the record's cover: write-new, commit-record, delete-old, in
/// that order. The record commit is the point of no return - before it a
/// failure deletes the new asset and leaves the record pointing at the old,
/// intact one; after it the old asset is the one reclaimed.
pub async fn replace_asset(
    state: &AppState,
    book: &Book,
    upload: &ValidPath,
    payload: UpdateBook,
) -> ApiResult<Book> {
    let new_cover = store_new_asset(state, upload).await?;

    let repository = BookRepository::new(state.pool().clone());
    match repository.update(book.id, payload, Some(&new_cover)).await {
        Ok(updated) => {
            if let Some(old_cover) = &book.cover {
                reclaim_cover(state, old_cover.clone(), "replaced cover").await;
            }
            Ok(updated)
        }
        Err(e) => {
            // compensating cleanup must finish before the error surfaces,
            // otherwise the new asset would be left orphaned
            reclaim_cover(state, new_cover, "orphaned cover").await;
            Err(e.into())
        }
    }
}

/// Reclaims a cover on its own task, so a caller abandoning the request
/// cannot cancel the delete halfway; still awaited, so compensation is done
/// before any error is reported. Failures are logged, never propagated.
pub async fn reclaim_cover(state: &AppState, cover: String, context: &'static str) {
    let state = state.clone();
    let task = tokio::spawn(async move {
        if let Err(e) = release_asset(&state, &cover).await {
            error!("Failed to delete {context} {cover}: {e}");
        }
    });
    task.await.ok();
}

/// Deletes a stored cover file. Already absent counts as success; any other
/// filesystem failure is surfaced for the caller to report - it never rolls
/// back the record mutation that triggered the release.
pub async fn release_asset(state: &AppState, cover: &str) -> Result<(), StoreError> {
    let path = ValidPath::new(cover)?.with_prefix(StorePrefix::Covers);
    state.store().remove(&path).await
}
