use grimoire_dal::book::{BookRepositoryImpl, CreateBook};

/// File backed database with several pool connections, so rating writers
/// genuinely race instead of being serialized by a single connection.
async fn init_shared_db(dir: &std::path::Path) -> sqlx::Pool<sqlx::Sqlite> {
    let db_url = format!("sqlite://{}?mode=rwc", dir.join("books.db").display());
    let conn = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await
        .unwrap();
    sqlx::migrate!("../../migrations").run(&conn).await.unwrap();
    conn
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_are_not_lost() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let conn = init_shared_db(tmp_dir.path()).await;

    let repo = BookRepositoryImpl::new(conn.clone());
    let book = repo
        .create(
            CreateBook {
                title: "Hordubal".to_string(),
                author: "Karel Capek".to_string(),
                genre: None,
                year: Some(1933),
            },
            "ivan",
            "hordubal.webp",
        )
        .await
        .unwrap();

    let grades: Vec<i64> = vec![1, 2, 3, 4, 5, 1, 2, 3];
    let mut handles = Vec::new();
    for (i, grade) in grades.iter().copied().enumerate() {
        let conn = conn.clone();
        let id = book.id;
        handles.push(tokio::spawn(async move {
            let repo = BookRepositoryImpl::new(conn);
            repo.submit_rating(id, &format!("user-{i}"), grade).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let final_book = repo.get(book.id).await.unwrap();
    assert_eq!(final_book.ratings.len(), grades.len());
    let expected = grades.iter().sum::<i64>() as f64 / grades.len() as f64;
    assert!((final_book.average_rating - expected).abs() < 1e-9);
}
