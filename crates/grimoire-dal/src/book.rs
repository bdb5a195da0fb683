use garde::Validate;
use serde::{Deserialize, Serialize};
use sqlx::Row as _;
use tracing::debug;

use crate::{
    ChosenRow, ListingParams, MAX_WRITE_RETRIES,
    error::{Error, Result},
    rating::{self, Rating},
};

const ORDER_FIELDS: &[&str] = &["id", "title", "author", "year", "average_rating", "created"];

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,

    pub title: String,

    pub author: String,

    pub genre: Option<String>,

    pub year: Option<i64>,

    /// Set at creation, never reassigned. Mutations other than rating
    /// require the caller to be this user.
    pub owner_id: String,

    /// Generated file name of the current cover asset.
    pub cover: Option<String>,

    pub ratings: Vec<Rating>,

    pub average_rating: f64,

    pub version: i64,
    pub created: time::PrimitiveDateTime,
    pub modified: time::PrimitiveDateTime,
}

impl sqlx::FromRow<'_, ChosenRow> for Book {
    fn from_row(row: &ChosenRow) -> Result<Self, sqlx::Error> {
        let ratings_json: String = row.try_get("ratings")?;
        let ratings = serde_json::from_str(&ratings_json).map_err(|e| sqlx::Error::ColumnDecode {
            index: "ratings".into(),
            source: Box::new(e),
        })?;
        Ok(Book {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            genre: row.try_get("genre")?,
            year: row.try_get("year")?,
            owner_id: row.try_get("owner_id")?,
            cover: row.try_get("cover")?,
            ratings,
            average_rating: row.try_get("average_rating")?,
            version: row.try_get("version")?,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct CreateBook {
    #[garde(length(min = 1, max = 511))]
    pub title: String,
    #[garde(length(min = 1, max = 255))]
    pub author: String,
    #[garde(length(min = 1, max = 255))]
    pub genre: Option<String>,
    #[garde(range(min = 0, max = 3000))]
    pub year: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct UpdateBook {
    #[garde(length(min = 1, max = 511))]
    pub title: String,
    #[garde(length(min = 1, max = 255))]
    pub author: String,
    #[garde(length(min = 1, max = 255))]
    pub genre: Option<String>,
    #[garde(range(min = 0, max = 3000))]
    pub year: Option<i64>,
}

pub type BookRepository = BookRepositoryImpl<crate::Pool>;

pub struct BookRepositoryImpl<E> {
    executor: E,
}

impl<'c, E> BookRepositoryImpl<E>
where
    for<'a> &'a E: sqlx::Executor<'c, Database = crate::ChosenDB>,
{
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub async fn create(&self, payload: CreateBook, owner_id: &str, cover: &str) -> Result<Book> {
        const SQL: &str = r#"
        INSERT INTO book (title, author, genre, year, owner_id, cover, ratings, average_rating, version, created, modified)
        VALUES (?, ?, ?, ?, ?, ?, '[]', 0, 1, datetime(), datetime())
        "#;
        let result = sqlx::query(SQL)
            .bind(&payload.title)
            .bind(&payload.author)
            .bind(&payload.genre)
            .bind(payload.year)
            .bind(owner_id)
            .bind(cover)
            .execute(&self.executor)
            .await?;
        let id = result.last_insert_rowid();
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Book> {
        const SQL: &str = "SELECT * FROM book WHERE id = ?";
        sqlx::query_as::<_, Book>(SQL)
            .bind(id)
            .fetch_optional(&self.executor)
            .await?
            .ok_or_else(|| Error::RecordNotFound("Book".to_string()))
    }

    pub async fn list(&self, params: ListingParams) -> Result<Vec<Book>> {
        let ordering = params.ordering(ORDER_FIELDS)?;
        let sql = if ordering.is_empty() {
            "SELECT * FROM book LIMIT ? OFFSET ?".to_string()
        } else {
            format!("SELECT * FROM book ORDER BY {ordering} LIMIT ? OFFSET ?")
        };
        let books = sqlx::query_as::<_, Book>(&sql)
            .bind(params.limit)
            .bind(params.offset)
            .fetch_all(&self.executor)
            .await?;
        Ok(books)
    }

    /// Best rated books first. Ordering between books with equal averages
    /// follows storage order and is not defined.
    pub async fn top_rated(&self, limit: u32) -> Result<Vec<Book>> {
        const SQL: &str = "SELECT * FROM book ORDER BY average_rating DESC LIMIT ?";
        let books = sqlx::query_as::<_, Book>(SQL)
            .bind(limit)
            .fetch_all(&self.executor)
            .await?;
        Ok(books)
    }

    /// Whole-record field overwrite. When `new_cover` is given the cover
    /// reference is committed in the same write as the fields, so the
    /// record transition is all-or-nothing.
    pub async fn update(
        &self,
        id: i64,
        payload: UpdateBook,
        new_cover: Option<&str>,
    ) -> Result<Book> {
        const SQL: &str = r#"
        UPDATE book SET title = ?, author = ?, genre = ?, year = ?, cover = coalesce(?, cover),
            version = version + 1, modified = datetime()
        WHERE id = ? AND version = ?
        "#;
        for _ in 0..MAX_WRITE_RETRIES {
            let book = self.get(id).await?;
            let result = sqlx::query(SQL)
                .bind(&payload.title)
                .bind(&payload.author)
                .bind(&payload.genre)
                .bind(payload.year)
                .bind(new_cover)
                .bind(id)
                .bind(book.version)
                .execute(&self.executor)
                .await?;
            if result.rows_affected() > 0 {
                return self.get(id).await;
            }
            debug!("Book {id} was concurrently modified, retrying update");
        }
        Err(Error::WriteConflict)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        match sqlx::query_scalar::<_, i64>("SELECT id FROM book WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.executor)
            .await?
        {
            Some(_id) => {
                sqlx::query("DELETE FROM book WHERE id = ?")
                    .bind(id)
                    .execute(&self.executor)
                    .await?;

                Ok(())
            }
            None => Err(Error::RecordNotFound("Book".to_string())),
        }
    }

    /// Accepts one vote per user and recomputes the average atomically with
    /// it. The read-merge-write sequence is serialized per record through
    /// the version column - a concurrent writer makes the conditional
    /// update a no-op and the whole sequence is retried on a fresh read.
    pub async fn submit_rating(&self, id: i64, user_id: &str, grade: i64) -> Result<Book> {
        let grade = rating::validate_grade(grade)?;
        for _ in 0..MAX_WRITE_RETRIES {
            let book = self.get(id).await?;
            let mut ratings = book.ratings;
            let average = rating::record_vote(&mut ratings, user_id, grade)?;
            match self
                .try_replace_ratings(id, book.version, &ratings, average)
                .await?
            {
                Some(updated) => return Ok(updated),
                None => debug!("Book {id} was concurrently rated, retrying"),
            }
        }
        Err(Error::WriteConflict)
    }

    async fn try_replace_ratings(
        &self,
        id: i64,
        expected_version: i64,
        ratings: &[Rating],
        average: f64,
    ) -> Result<Option<Book>> {
        const SQL: &str = r#"
        UPDATE book SET ratings = ?, average_rating = ?, version = version + 1, modified = datetime()
        WHERE id = ? AND version = ?
        "#;
        let payload = serde_json::to_string(ratings)?;
        let result = sqlx::query(SQL)
            .bind(payload)
            .bind(average)
            .bind(id)
            .bind(expected_version)
            .execute(&self.executor)
            .await?;
        if result.rows_affected() == 0 {
            Ok(None)
        } else {
            self.get(id).await.map(Some)
        }
    }
}
