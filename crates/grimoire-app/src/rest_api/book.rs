use grimoire_dal::book::BookRepository;

use crate::state::AppState;
#[allow(unused_imports)]
use axum::routing::{delete, get, post, put};

crate::repository_from_request!(BookRepository);

mod crud_api {
    use super::*;
    use crate::assets;
    use crate::auth::ensure_owner;
    use crate::error::{ApiError, ApiResult};
    use axum::{
        Json,
        extract::{FromRequest as _, Multipart, Path, Request, State, multipart::Field},
        http::{StatusCode, header::CONTENT_TYPE},
        response::IntoResponse,
    };
    use futures::TryStreamExt as _;
    use garde::Validate as _;
    use grimoire_dal::{ListingParams, book::{CreateBook, UpdateBook}};
    use grimoire_store::{Store as _, ValidPath, error::StoreError, upload_path};
    use grimoire_types::claim::ApiClaim;
    use grimoire_types::utils::image_ext_for_mime;
    use serde::Deserialize;
    use tracing::{debug, error, warn};

    pub async fn list(repository: BookRepository) -> ApiResult<impl IntoResponse> {
        let books = repository.list(ListingParams::default()).await?;
        Ok((StatusCode::OK, Json(books)))
    }

    pub async fn get(
        Path(id): Path<i64>,
        repository: BookRepository,
    ) -> ApiResult<impl IntoResponse> {
        let record = repository.get(id).await?;

        Ok((StatusCode::OK, Json(record)))
    }

    pub async fn top_rated(
        State(state): State<AppState>,
        repository: BookRepository,
    ) -> ApiResult<impl IntoResponse> {
        let records = repository
            .top_rated(state.config().top_rated_limit)
            .await?;
        Ok((StatusCode::OK, Json(records)))
    }

    pub async fn create(
        State(state): State<AppState>,
        claim: ApiClaim,
        repository: BookRepository,
        multipart: Multipart,
    ) -> ApiResult<impl IntoResponse> {
        let parts = read_book_multipart(&state, multipart).await?;
        let payload: CreateBook = match parse_payload(&parts.book) {
            Ok(payload) => payload,
            Err(e) => {
                // a rejected request must not leave a spooled upload behind
                discard_upload(&state, parts.image.as_ref()).await;
                return Err(e);
            }
        };
        let upload = parts
            .image
            .ok_or_else(|| ApiError::InvalidRequest("Missing image field".into()))?;

        let cover = assets::store_new_asset(&state, &upload).await?;
        match repository.create(payload, &claim.sub, &cover).await {
            Ok(record) => Ok((StatusCode::CREATED, Json(record))),
            Err(e) => {
                // a record that was never created must not pin an asset
                assets::reclaim_cover(&state, cover, "orphaned cover").await;
                Err(e.into())
            }
        }
    }

    /// Field edits, optionally with a replacement image. Accepts either a
    /// plain JSON body or multipart with a `book` JSON field plus `image`.
    pub async fn update(
        Path(id): Path<i64>,
        State(state): State<AppState>,
        claim: ApiClaim,
        repository: BookRepository,
        request: Request,
    ) -> ApiResult<impl IntoResponse> {
        let record = repository.get(id).await?;
        ensure_owner(&claim, &record)?;

        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        let updated = if is_multipart {
            let multipart = Multipart::from_request(request, &state)
                .await
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            let parts = read_book_multipart(&state, multipart).await?;
            let payload: UpdateBook = match parse_payload(&parts.book) {
                Ok(payload) => payload,
                Err(e) => {
                    discard_upload(&state, parts.image.as_ref()).await;
                    return Err(e);
                }
            };
            match parts.image {
                Some(upload) => assets::replace_asset(&state, &record, &upload, payload).await?,
                None => repository.update(id, payload, None).await?,
            }
        } else {
            let Json(payload) = Json::<UpdateBook>::from_request(request, &state)
                .await
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            payload
                .validate()
                .map_err(|e| ApiError::UnprocessableRequest(e.to_string()))?;
            repository.update(id, payload, None).await?
        };
        Ok((StatusCode::OK, Json(updated)))
    }

    pub async fn delete(
        Path(id): Path<i64>,
        State(state): State<AppState>,
        claim: ApiClaim,
        repository: BookRepository,
    ) -> ApiResult<impl IntoResponse> {
        let record = repository.get(id).await?;
        ensure_owner(&claim, &record)?;
        repository.delete(id).await?;

        // a failed cover delete is reported but never blocks the record
        // deletion that already went through
        let mut message = "Book deleted".to_string();
        if let Some(cover) = &record.cover {
            if let Err(e) = assets::release_asset(&state, cover).await {
                error!("Failed to delete cover {cover} of deleted book {id}: {e}");
                message = format!("Book deleted, but its cover was not: {e}");
            }
        }
        Ok((StatusCode::OK, Json(serde_json::json!({ "message": message }))))
    }

    #[derive(Debug, Deserialize)]
    pub struct RatingPayload {
        pub rating: i64,
    }

    pub async fn rate(
        Path(id): Path<i64>,
        claim: ApiClaim,
        repository: BookRepository,
        Json(payload): Json<RatingPayload>,
    ) -> ApiResult<impl IntoResponse> {
        let record = repository
            .submit_rating(id, &claim.sub, payload.rating)
            .await?;
        Ok((StatusCode::OK, Json(record)))
    }

    struct BookMultipart {
        /// raw JSON from the `book` field
        book: String,
        /// spooled upload from the `image` field, when present
        image: Option<ValidPath>,
    }

    async fn read_book_multipart(
        state: &AppState,
        mut multipart: Multipart,
    ) -> ApiResult<BookMultipart> {
        let mut book = None;
        let mut image = None;
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(|s| s.to_string());
            match name.as_deref() {
                Some("book") => book = Some(field.text().await?),
                Some("image") => image = Some(spool_upload(state, field).await?),
                _ => continue,
            }
        }
        let book = book.ok_or_else(|| ApiError::InvalidRequest("Missing book field".into()))?;
        Ok(BookMultipart { book, image })
    }

    async fn discard_upload(state: &AppState, upload: Option<&ValidPath>) {
        if let Some(upload) = upload {
            if let Err(e) = state.store().remove(upload).await {
                warn!("Failed to remove uploaded file {:?}: {e}", upload.as_ref());
            }
        }
    }

    async fn spool_upload(state: &AppState, field: Field<'_>) -> ApiResult<ValidPath> {
        let mime = field
            .content_type()
            .ok_or_else(|| ApiError::InvalidRequest("Missing image content type".into()))?
            .to_string();
        let ext = image_ext_for_mime(&mime).ok_or_else(|| {
            ApiError::UnprocessableRequest(format!("Unsupported image type: {mime}"))
        })?;

        let dest_path = upload_path(ext)?;
        debug!("Spooling upload to {:?}, mime {}", dest_path, mime);
        let stream = field.map_err(|e| {
            StoreError::StreamError(format!("Error reading multipart field in request: {e}"))
        });
        let info = state.store().store_stream(&dest_path, stream).await?;
        Ok(info.final_path)
    }

    fn parse_payload<T>(raw: &str) -> ApiResult<T>
    where
        T: serde::de::DeserializeOwned + garde::Validate<Context = ()>,
    {
        let payload: T = serde_json::from_str(raw)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid book payload: {e}")))?;
        payload
            .validate()
            .map_err(|e| ApiError::UnprocessableRequest(e.to_string()))?;
        Ok(payload)
    }
}

pub fn router(limit_mb: usize) -> axum::Router<AppState> {
    use axum::extract::DefaultBodyLimit;
    axum::Router::new()
        .route("/", get(crud_api::list).post(crud_api::create))
        .route("/bestrating", get(crud_api::top_rated))
        .route(
            "/{id}",
            get(crud_api::get)
                .put(crud_api::update)
                .delete(crud_api::delete),
        )
        .route("/{id}/rating", post(crud_api::rate))
        .layer(DefaultBodyLimit::max(1024 * 1024 * limit_mb))
}
