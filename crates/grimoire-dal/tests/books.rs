use grimoire_dal::{
    Error, ListingParams, Order,
    book::{BookRepositoryImpl, CreateBook, UpdateBook},
};

async fn init_db() -> sqlx::Pool<sqlx::Sqlite> {
    const DB_URL: &str = "sqlite::memory:";
    let conn = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .connect(DB_URL)
        .await
        .unwrap();
    sqlx::migrate!("../../migrations").run(&conn).await.unwrap();

    conn
}

fn new_book(title: &str) -> CreateBook {
    CreateBook {
        title: title.to_string(),
        author: "Karel Capek".to_string(),
        genre: Some("sci-fi".to_string()),
        year: Some(1936),
    }
}

#[tokio::test]
async fn test_book_create_and_get() {
    let conn = init_db().await;
    let repo = BookRepositoryImpl::new(conn);

    let book = repo
        .create(new_book("Valka s mloky"), "ivan", "abcd.webp")
        .await
        .unwrap();
    assert_eq!(book.title, "Valka s mloky");
    assert_eq!(book.owner_id, "ivan");
    assert_eq!(book.cover.as_deref(), Some("abcd.webp"));
    assert!(book.ratings.is_empty());
    assert_eq!(book.average_rating, 0.0);
    assert_eq!(book.version, 1);

    let fetched = repo.get(book.id).await.unwrap();
    assert_eq!(fetched.title, book.title);

    let missing = repo.get(book.id + 1000).await;
    assert!(matches!(missing, Err(Error::RecordNotFound(_))));
}

#[tokio::test]
async fn test_book_update() {
    let conn = init_db().await;
    let repo = BookRepositoryImpl::new(conn);

    let book = repo
        .create(new_book("Valka s mloky"), "ivan", "old.webp")
        .await
        .unwrap();

    let payload = UpdateBook {
        title: "Krakatit".to_string(),
        author: book.author.clone(),
        genre: None,
        year: Some(1924),
    };

    let updated = repo.update(book.id, payload.clone(), None).await.unwrap();
    assert_eq!(updated.title, "Krakatit");
    assert_eq!(updated.genre, None);
    // cover untouched when no replacement is given
    assert_eq!(updated.cover.as_deref(), Some("old.webp"));
    assert!(updated.version > book.version);

    let updated = repo
        .update(book.id, payload, Some("new.webp"))
        .await
        .unwrap();
    assert_eq!(updated.cover.as_deref(), Some("new.webp"));
}

#[tokio::test]
async fn test_book_delete() {
    let conn = init_db().await;
    let repo = BookRepositoryImpl::new(conn);

    let book = repo
        .create(new_book("Valka s mloky"), "ivan", "abcd.webp")
        .await
        .unwrap();
    repo.delete(book.id).await.unwrap();

    let res = repo.get(book.id).await;
    assert!(matches!(res, Err(Error::RecordNotFound(_))));

    let res = repo.delete(book.id).await;
    assert!(matches!(res, Err(Error::RecordNotFound(_))));
}

#[tokio::test]
async fn test_listing() {
    let conn = init_db().await;
    let repo = BookRepositoryImpl::new(conn);

    for title in ["Anna", "Cyrano", "Babicka"] {
        repo.create(new_book(title), "ivan", "x.webp").await.unwrap();
    }

    let all = repo.list(ListingParams::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let params =
        ListingParams::default().with_order(vec![Order::Asc("title".to_string())]);
    let sorted = repo.list(params).await.unwrap();
    let titles: Vec<_> = sorted.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, ["Anna", "Babicka", "Cyrano"]);

    let params = ListingParams::default().with_order(vec![Order::Asc("bogus".to_string())]);
    let res = repo.list(params).await;
    assert!(matches!(res, Err(Error::InvalidOrderByField(_))));
}

#[tokio::test]
async fn test_rating_flow() {
    let conn = init_db().await;
    let repo = BookRepositoryImpl::new(conn);

    let book = repo
        .create(new_book("Valka s mloky"), "ivan", "abcd.webp")
        .await
        .unwrap();

    let book = repo.submit_rating(book.id, "alice", 5).await.unwrap();
    assert_eq!(book.ratings.len(), 1);
    assert_eq!(book.average_rating, 5.0);

    let book = repo.submit_rating(book.id, "bob", 2).await.unwrap();
    assert_eq!(book.ratings.len(), 2);
    assert!((book.average_rating - 3.5).abs() < 1e-9);

    // votes are final
    let res = repo.submit_rating(book.id, "alice", 1).await;
    assert!(matches!(res, Err(Error::RatingExists(_))));
    let unchanged = repo.get(book.id).await.unwrap();
    assert_eq!(unchanged.ratings.len(), 2);
    assert!((unchanged.average_rating - 3.5).abs() < 1e-9);

    // bounds
    assert!(matches!(
        repo.submit_rating(book.id, "carol", 0).await,
        Err(Error::RatingOutOfRange(0))
    ));
    assert!(matches!(
        repo.submit_rating(book.id, "carol", 6).await,
        Err(Error::RatingOutOfRange(6))
    ));
    let book = repo.submit_rating(book.id, "carol", 1).await.unwrap();
    assert_eq!(book.ratings.len(), 3);

    let res = repo.submit_rating(book.id + 1000, "dave", 3).await;
    assert!(matches!(res, Err(Error::RecordNotFound(_))));
}

#[tokio::test]
async fn test_top_rated() {
    let conn = init_db().await;
    let repo = BookRepositoryImpl::new(conn);

    // five books with distinct averages 1..=5
    for grade in 1..=5i64 {
        let book = repo
            .create(new_book(&format!("Book {grade}")), "ivan", "x.webp")
            .await
            .unwrap();
        repo.submit_rating(book.id, "alice", grade).await.unwrap();
    }

    let top = repo.top_rated(3).await.unwrap();
    assert_eq!(top.len(), 3);
    let averages: Vec<f64> = top.iter().map(|b| b.average_rating).collect();
    assert_eq!(averages, [5.0, 4.0, 3.0]);
}
