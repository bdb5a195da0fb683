pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Ratings serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("User {0} has already rated this book, ratings are final")]
    RatingExists(String),

    #[error("Rating grade {0} is out of range, accepted range is {min} to {max}", min = crate::rating::MIN_GRADE, max = crate::rating::MAX_GRADE)]
    RatingOutOfRange(i64),

    #[error("Invalid order by field: {0}")]
    InvalidOrderByField(String),

    #[error("Record was concurrently modified too many times, giving up")]
    WriteConflict,
}
