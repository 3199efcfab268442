//! HTTP-level tests driving the router directly.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use bookvault::{AppState, Config, Database, create_router, crypto};
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "bookvault-test-boundary";

struct TestApp {
    router: Router,
    db: Database,
    dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_limits(0, 0)
    }

    fn with_limits(register_per_minute: u32, login_per_minute: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        config.auth.register_per_minute = register_per_minute;
        config.auth.login_per_minute = login_per_minute;
        config.storage.encryption_key = crypto::generate_key();
        config.storage.files_dir = dir.path().join("files");
        config.storage.covers_dir = dir.path().join("covers");

        let db = Database::open_memory().unwrap();
        let state = AppState::new(config, db.clone()).unwrap();

        Self {
            router: create_router(state),
            db,
            dir,
        }
    }

    fn files_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("files")
    }

    fn covers_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("covers")
    }

    async fn send_raw(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send_raw(req).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn register(&self, kind: &str, email: &str) -> StatusCode {
        let body = json!({
            "name": "Test User",
            "email": email,
            "password": "password123",
            "phone": "555-0100",
            "geo_location": "Lisbon",
            "address": "1 Main St",
        });
        let (status, _) = self
            .send(json_request(Method::POST, &format!("/auth/{}/register", kind), None, body))
            .await;
        status
    }

    async fn login(&self, kind: &str, email: &str) -> String {
        let body = json!({ "email": email, "password": "password123" });
        let (status, value) = self
            .send(json_request(Method::POST, &format!("/auth/{}/login", kind), None, body))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", value);
        value["access_token"].as_str().unwrap().to_string()
    }

    async fn publisher(&self, email: &str) -> String {
        assert_eq!(self.register("pub", email).await, StatusCode::CREATED);
        self.login("pub", email).await
    }

    async fn reader(&self, email: &str) -> String {
        assert_eq!(self.register("reader", email).await, StatusCode::CREATED);
        self.login("reader", email).await
    }

    async fn category(&self, token: &str, name: &str) -> i64 {
        let (status, value) = self
            .send(json_request(
                Method::POST,
                "/book/pub/add_category",
                Some(token),
                json!({ "category_name": name }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        value["category_id"].as_i64().unwrap()
    }

    async fn upload(&self, token: &str, category_id: i64, file_name: &str, data: &[u8]) -> (StatusCode, Value) {
        let category = category_id.to_string();
        let fields = [
            ("title", "The Test Book"),
            ("author", "Ann Author"),
            ("isbn", "978-0000000000"),
            ("category_id", category.as_str()),
            ("price", "9.99"),
        ];
        let files = [("file", file_name, data), ("cover_image", "front.png", b"PNGDATA".as_slice())];
        self.send(multipart_request(
            Method::POST,
            "/files/pub/upload_book",
            token,
            &fields,
            &files,
        ))
        .await
    }

    async fn book(&self, token: &str) -> (i64, String) {
        let category_id = self.category(token, "Fiction").await;
        let (status, value) = self
            .upload(token, category_id, "novel.epub", b"EPUB chapter one")
            .await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {}", value);
        (
            value["book_id"].as_i64().unwrap(),
            value["file_name"].as_str().unwrap().to_string(),
        )
    }
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(
    method: Method,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, value) = app.send(request(Method::GET, "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = TestApp::new();
    assert_eq!(app.register("reader", "dup@example.com").await, StatusCode::CREATED);
    assert_eq!(app.register("reader", "dup@example.com").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.db.count_rows("readers").unwrap(), 1);
}

#[tokio::test]
async fn registration_requires_all_fields() {
    let app = TestApp::new();
    let (status, value) = app
        .send(json_request(
            Method::POST,
            "/auth/pub/register",
            None,
            json!({ "email": "x@example.com", "password": "password123" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Missing required fields");
}

#[tokio::test]
async fn login_returns_token_and_rejects_bad_password() {
    let app = TestApp::new();
    app.register("pub", "p@example.com").await;

    let (status, value) = app
        .send(json_request(
            Method::POST,
            "/auth/pub/login",
            None,
            json!({ "email": "p@example.com", "password": "nope" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value["error"], "Invalid email or password");

    let token = app.login("pub", "p@example.com").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn tokens_are_required_and_role_scoped() {
    let app = TestApp::new();
    let reader = app.reader("r@example.com").await;

    let (status, _) = app
        .send(request(Method::GET, "/book/pub/get_categories", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(request(Method::GET, "/book/pub/get_categories", Some("garbage")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(request(Method::GET, "/book/pub/get_categories", Some(&reader)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn category_routes_are_mounted_twice() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    app.category(&token, "Poetry").await;

    for uri in ["/book/pub/get_categories", "/category/pub/get_categories"] {
        let (status, value) = app.send(request(Method::GET, uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["categories"][0]["category_name"], "Poetry");
    }
}

#[tokio::test]
async fn upload_rejects_bad_extension() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    let category_id = app.category(&token, "Fiction").await;

    let (status, value) = app.upload(&token, category_id, "notes.txt", b"plain").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Invalid file type");

    assert_eq!(app.db.count_rows("books").unwrap(), 0);
    assert_eq!(app.db.count_rows("files").unwrap(), 0);
    assert_eq!(file_count(&app.files_dir()), 0);
    assert_eq!(file_count(&app.covers_dir()), 0);
}

#[tokio::test]
async fn upload_rejects_foreign_category() {
    let app = TestApp::new();
    let owner = app.publisher("a@example.com").await;
    let other = app.publisher("b@example.com").await;
    let category_id = app.category(&owner, "Fiction").await;

    let (status, value) = app.upload(&other, category_id, "novel.epub", b"data").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Invalid category ID");
    assert_eq!(app.db.count_rows("books").unwrap(), 0);
}

#[tokio::test]
async fn upload_then_stream_returns_original_bytes() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    let reader = app.reader("r@example.com").await;
    let (book_id, file_name) = app.book(&publisher).await;
    assert_eq!(file_name, format!("{}.epub.enc", book_id));

    // Stored blob is not the plaintext
    let on_disk = std::fs::read(app.files_dir().join(&file_name)).unwrap();
    assert_ne!(on_disk, b"EPUB chapter one".to_vec());
    assert!(!on_disk.windows(7).any(|w| w == b"chapter"));

    let uri = format!("/book/stream/{}", file_name);
    let (status, body) = app.send_raw(request(Method::GET, &uri, Some(&publisher))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"EPUB chapter one".to_vec());

    // Readers need a purchase first
    let (status, _) = app.send_raw(request(Method::GET, &uri, Some(&reader))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/book/reader/purchase_book",
            Some(&reader),
            json!({ "book_id": book_id }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.send_raw(request(Method::GET, &uri, Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"EPUB chapter one".to_vec());
}

#[tokio::test]
async fn stream_rejects_unknown_and_unsafe_names() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    app.book(&publisher).await;

    for uri in ["/book/stream/999.epub.enc", "/book/stream/..%2Fsecret"] {
        let (status, _) = app.send_raw(request(Method::GET, uri, Some(&publisher))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn cover_is_served_to_any_account() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    let reader = app.reader("r@example.com").await;
    let (book_id, _) = app.book(&publisher).await;

    let uri = format!("/book/cover/{}.png", book_id);
    let (status, body) = app.send_raw(request(Method::GET, &uri, Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"PNGDATA".to_vec());

    let (status, _) = app.send_raw(request(Method::GET, &uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn publisher_cannot_touch_another_publishers_book() {
    let app = TestApp::new();
    let owner = app.publisher("a@example.com").await;
    let other = app.publisher("b@example.com").await;
    let (book_id, file_name) = app.book(&owner).await;

    let (status, _) = app
        .send(request(Method::GET, &format!("/book/pub/get_book/{}", book_id), Some(&other)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(multipart_request(
            Method::PUT,
            &format!("/files/pub/update_book/{}", book_id),
            &other,
            &[("title", "Hijacked")],
            &[],
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(request(Method::DELETE, &format!("/book/pub/delete_book/{}", book_id), Some(&other)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send_raw(request(Method::GET, &format!("/book/stream/{}", file_name), Some(&other)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, value) = app
        .send(request(Method::GET, &format!("/book/pub/get_book/{}", book_id), Some(&owner)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["title"], "The Test Book");
    assert_eq!(value["price"], "9.99");
}

#[tokio::test]
async fn empty_catalogue_is_not_found() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;

    let (status, _) = app
        .send(request(Method::GET, "/book/pub/get_all_books", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.book(&token).await;
    let (status, value) = app
        .send(request(Method::GET, "/book/pub/get_all_books", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn category_with_books_cannot_be_deleted() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    let (book_id, _) = app.book(&token).await;
    let category_id = app.db.get_book(book_id).unwrap().unwrap().category_id;

    let uri = format!("/category/pub/delete_category/{}", category_id);
    let (status, value) = app.send(request(Method::DELETE, &uri, Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Cannot delete category with associated books");

    let (status, _) = app
        .send(request(Method::DELETE, &format!("/book/pub/delete_book/{}", book_id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(request(Method::DELETE, &uri, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn update_book_replaces_content_file() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    let (book_id, old_name) = app.book(&token).await;

    let (status, value) = app
        .send(multipart_request(
            Method::PUT,
            &format!("/upload/pub/update_book/{}", book_id),
            &token,
            &[("title", "Second Edition"), ("price", "12")],
            &[("file", "edition.pdf", b"%PDF second edition".as_slice())],
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", value);
    let new_name = format!("{}.pdf.enc", book_id);
    assert_eq!(value["file_name"], new_name.as_str());

    assert!(!app.files_dir().join(&old_name).exists());
    assert!(app.db.find_book_file(&new_name).unwrap().is_some());

    let (status, body) = app
        .send_raw(request(Method::GET, &format!("/book/stream/{}", new_name), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"%PDF second edition".to_vec());

    let book = app.db.get_book(book_id).unwrap().unwrap();
    assert_eq!(book.title, "Second Edition");
    assert_eq!(book.price, "12.00");
    assert_eq!(book.author, "Ann Author");
}

#[tokio::test]
async fn update_book_rejects_bad_files_without_leftovers() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    let (book_id, file_name) = app.book(&token).await;
    let uri = format!("/upload/pub/update_book/{}", book_id);

    let (status, value) = app
        .send(multipart_request(
            Method::PUT,
            &uri,
            &token,
            &[("title", "Renamed")],
            &[("file", "notes.txt", b"plain".as_slice())],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Invalid file type");

    // The content file is staged before the cover is checked
    let (status, value) = app
        .send(multipart_request(
            Method::PUT,
            &uri,
            &token,
            &[("title", "Renamed")],
            &[
                ("file", "edition.pdf", b"%PDF".as_slice()),
                ("cover_image", "front.gif", b"GIF89a".as_slice()),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Invalid cover image type");

    assert_eq!(file_count(&app.files_dir()), 1);
    assert_eq!(file_count(&app.covers_dir()), 1);
    assert!(app.files_dir().join(&file_name).exists());

    let book = app.db.get_book(book_id).unwrap().unwrap();
    assert_eq!(book.title, "The Test Book");
    assert_eq!(book.epub_file.as_deref(), Some(file_name.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_keep_the_referenced_file() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    let (book_id, _) = app.book(&token).await;
    let uri = format!("/files/pub/update_book/{}", book_id);

    for round in 0..25 {
        let tasks: Vec<_> = [("edition.pdf", "%PDF"), ("edition.epub", "EPUB")]
            .into_iter()
            .map(|(name, prefix)| {
                let body = format!("{} round {}", prefix, round);
                let req = multipart_request(
                    Method::PUT,
                    &uri,
                    &token,
                    &[],
                    &[("file", name, body.as_bytes())],
                );
                let router = app.router.clone();
                tokio::spawn(async move { router.oneshot(req).await.unwrap().status() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), StatusCode::OK);
        }

        let stored = app.db.get_book(book_id).unwrap().unwrap().epub_file.unwrap();
        assert!(app.files_dir().join(&stored).exists(), "round {}: {} is missing", round, stored);
        assert_eq!(file_count(&app.files_dir()), 1, "round {}", round);

        let (status, body) = app
            .send_raw(request(Method::GET, &format!("/book/stream/{}", stored), Some(&token)))
            .await;
        assert_eq!(status, StatusCode::OK);
        let prefix = if stored.ends_with(".pdf.enc") { "%PDF" } else { "EPUB" };
        assert_eq!(body, format!("{} round {}", prefix, round).into_bytes());
    }
}

#[tokio::test]
async fn failed_file_move_removes_the_new_book() {
    let app = TestApp::new();
    let token = app.publisher("p@example.com").await;
    let category_id = app.category(&token, "Fiction").await;

    // A directory squatting on the first book's name makes the rename fail
    let squatter = app.files_dir().join("1.epub.enc");
    std::fs::create_dir_all(squatter.join("inner")).unwrap();

    let (status, value) = app
        .upload(&token, category_id, "novel.epub", b"EPUB chapter one")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["error"], "Internal server error");

    assert_eq!(app.db.count_rows("books").unwrap(), 0);
    assert_eq!(app.db.count_rows("files").unwrap(), 0);
    assert_eq!(file_count(&app.files_dir()), 1);
    assert_eq!(file_count(&app.covers_dir()), 0);

    std::fs::remove_dir_all(&squatter).unwrap();
    let (status, value) = app
        .upload(&token, category_id, "novel.epub", b"EPUB chapter one")
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", value);
    assert_eq!(value["book_id"], 2);
    assert_eq!(value["status"], "live");
}

#[tokio::test]
async fn add_highlight_uses_token_reader() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    let (book_id, _) = app.book(&publisher).await;

    let _first = app.reader("first@example.com").await;
    let second = app.reader("second@example.com").await;
    let second_id = app
        .db
        .get_reader_by_email("second@example.com")
        .unwrap()
        .unwrap()
        .reader_id;

    let (status, value) = app
        .send(json_request(
            Method::POST,
            "/book/reader/add_highlight",
            Some(&second),
            json!({ "book_id": book_id, "text": "quote", "highlight_range": "5-10" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["highlight"]["reader_id"], second_id);
    assert_eq!(value["highlight"]["color"], "yellow");

    let stored = app.db.get_highlights(second_id, book_id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].reader_id, second_id);

    let (status, value) = app
        .send(request(
            Method::GET,
            &format!("/book/reader/get_highlights/{}", book_id),
            Some(&second),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["reader_id"], second_id);
    assert_eq!(value["highlights"][0]["text"], "quote");
}

#[tokio::test]
async fn delete_book_cascades_rows_and_files() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    let reader = app.reader("r@example.com").await;
    let (book_id, file_name) = app.book(&publisher).await;

    let requests = [
        ("/book/reader/add_highlight", json!({ "book_id": book_id, "text": "t", "highlight_range": "1-2" })),
        ("/book/reader/add_note", json!({ "book_id": book_id, "text": "n", "note_range": "1-2" })),
        ("/book/reader/purchase_book", json!({ "book_id": book_id })),
        ("/book/reader/add_cart", json!({ "book_id": book_id })),
        ("/book/reader/add_wishlist", json!({ "book_id": book_id })),
    ];
    for (uri, body) in requests {
        let (status, value) = app
            .send(json_request(Method::POST, uri, Some(&reader), body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}: {}", uri, value);
    }
    assert!(app.files_dir().join(&file_name).exists());

    let (status, _) = app
        .send(request(Method::DELETE, &format!("/book/pub/delete_book/{}", book_id), Some(&publisher)))
        .await;
    assert_eq!(status, StatusCode::OK);

    for table in ["books", "files", "highlights", "notes", "books_purchased", "cart", "wishlist"] {
        assert_eq!(app.db.count_rows(table).unwrap(), 0, "{} not emptied", table);
    }
    assert!(!app.files_dir().join(&file_name).exists());
    assert_eq!(file_count(&app.covers_dir()), 0);
}

#[tokio::test]
async fn repeat_purchase_rejected_after_bookmark_moves() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    let reader = app.reader("r@example.com").await;
    let (book_id, _) = app.book(&publisher).await;

    let purchase = || {
        json_request(
            Method::POST,
            "/book/reader/purchase_book",
            Some(&reader),
            json!({ "book_id": book_id }),
        )
    };
    let (status, _) = app.send(purchase()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, value) = app
        .send(json_request(
            Method::PUT,
            "/book/reader/update_bookmark",
            Some(&reader),
            json!({ "book_id": book_id, "bookmark": 57 }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["purchase"]["bookmark"], 57);

    let (status, value) = app.send(purchase()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Book already purchased");

    let (status, value) = app
        .send(request(Method::GET, "/book/reader/get_purchased_books", Some(&reader)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["purchased_books"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["purchased_books"][0]["bookmark"], 57);
}

#[tokio::test]
async fn bookmark_must_be_in_range() {
    let app = TestApp::new();
    let reader = app.reader("r@example.com").await;

    let (status, _) = app
        .send(json_request(
            Method::PUT,
            "/book/reader/update_bookmark",
            Some(&reader),
            json!({ "book_id": 1, "bookmark": 150 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request(
            Method::PUT,
            "/book/reader/update_bookmark",
            Some(&reader),
            json!({ "book_id": 1, "bookmark": 50 }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cart_entries_belong_to_their_reader() {
    let app = TestApp::new();
    let publisher = app.publisher("p@example.com").await;
    let reader = app.reader("r@example.com").await;
    let other = app.reader("o@example.com").await;
    let (book_id, _) = app.book(&publisher).await;

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/book/reader/add_cart",
            Some(&reader),
            json!({ "book_id": book_id }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, value) = app
        .send(request(Method::GET, "/book/reader/get_cart", Some(&reader)))
        .await;
    let cart_id = value["cart"][0]["cart_id"].as_i64().unwrap();
    assert_eq!(value["cart"][0]["title"], "The Test Book");

    let uri = format!("/book/reader/delete_cart/{}", cart_id);
    let (status, _) = app.send(request(Method::DELETE, &uri, Some(&other))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(request(Method::DELETE, &uri, Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, value) = app
        .send(json_request(Method::POST, "/book/reader/add_wishlist", Some(&reader), json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Book ID is required");
}

#[tokio::test]
async fn registration_is_rate_limited() {
    let app = TestApp::with_limits(2, 0);

    assert_eq!(app.register("reader", "a@example.com").await, StatusCode::CREATED);
    assert_eq!(app.register("reader", "b@example.com").await, StatusCode::CREATED);
    assert_eq!(
        app.register("pub", "c@example.com").await,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(app.db.count_rows("publishers").unwrap(), 0);

    // Login has its own budget
    app.login("reader", "a@example.com").await;
}
