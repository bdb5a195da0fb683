use axum::{RequestPartsExt as _, extract::FromRequestParts, http::request::Parts};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use tracing::debug;

use grimoire_dal::book::Book;
use grimoire_types::claim::ApiClaim;

use crate::{error::ApiError, state::AppState};

impl FromRequestParts<AppState> for ApiClaim {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_token = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .ok()
            .map(|h| h.0.token().to_string());

        match header_token {
            Some(token) => {
                let claim = state.tokens().verify(&token).map_err(|e| {
                    debug!("Failed to validate token: {e}");
                    ApiError::NotAuthorized
                })?;
                Ok(claim)
            }
            None => {
                debug!("No bearer token found");
                Err(ApiError::NotAuthorized)
            }
        }
    }
}

/// Ownership check - mutations other than rating are allowed only to the
/// user that created the record. Deliberately distinct from `NotFound`.
pub fn ensure_owner(claim: &ApiClaim, book: &Book) -> Result<(), ApiError> {
    if claim.sub != book.owner_id {
        debug!("User {} is not the owner of book {}", claim.sub, book.id);
        return Err(ApiError::NotAuthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book(owner: &str) -> Book {
        let now = time::PrimitiveDateTime::new(
            time::Date::from_calendar_date(2024, time::Month::January, 1).unwrap(),
            time::Time::MIDNIGHT,
        );
        Book {
            id: 1,
            title: "Title".to_string(),
            author: "Author".to_string(),
            genre: None,
            year: None,
            owner_id: owner.to_string(),
            cover: None,
            ratings: Vec::new(),
            average_rating: 0.0,
            version: 1,
            created: now,
            modified: now,
        }
    }

    #[test]
    fn test_ensure_owner() {
        let claim = ApiClaim::new("alice");
        assert!(ensure_owner(&claim, &sample_book("alice")).is_ok());
        let res = ensure_owner(&claim, &sample_book("bob"));
        assert!(matches!(res, Err(ApiError::NotAuthorized)));
    }
}
