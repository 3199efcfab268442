//! HTTP server and routes.

mod handlers;
mod ratelimit;
mod state;

pub use ratelimit::RateLimiter;
pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};
use handlers::{auth, files, publisher, reader, upload};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let register_routes = Router::new()
        .route("/pub/register", post(auth::publisher_register))
        .route("/reader/register", post(auth::reader_register))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::limit_register,
        ));

    let login_routes = Router::new()
        .route("/pub/login", post(auth::publisher_login))
        .route("/reader/login", post(auth::reader_login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::limit_login,
        ));

    let category_routes = Router::new()
        .route("/pub/add_category", post(publisher::add_category))
        .route("/pub/get_categories", get(publisher::get_categories))
        .route(
            "/pub/delete_category/{id}",
            delete(publisher::delete_category),
        );

    let book_routes = Router::new()
        // Publisher catalogue
        .route(
            "/pub/get_books_by_cat/{category_id}",
            get(publisher::get_books_by_cat),
        )
        .route("/pub/get_book/{book_id}", get(publisher::get_book))
        .route("/pub/get_all_books", get(publisher::get_all_books))
        .route("/pub/delete_book/{book_id}", delete(publisher::delete_book))
        // Highlights and notes
        .route("/reader/add_highlight", post(reader::add_highlight))
        .route(
            "/reader/get_highlights/{book_id}",
            get(reader::get_highlights),
        )
        .route(
            "/reader/delete_highlight/{hl_id}",
            delete(reader::delete_highlight),
        )
        .route("/reader/add_note", post(reader::add_note))
        .route("/reader/get_notes/{book_id}", get(reader::get_notes))
        .route("/reader/delete_note/{note_id}", delete(reader::delete_note))
        // Purchases
        .route("/reader/purchase_book", post(reader::purchase_book))
        .route(
            "/reader/get_purchased_books",
            get(reader::get_purchased_books),
        )
        .route("/reader/update_bookmark", put(reader::update_bookmark))
        .route("/reader/get_book/{book_id}", get(reader::get_book))
        // Cart and wishlist
        .route("/reader/add_cart", post(reader::add_cart))
        .route("/reader/get_cart", get(reader::get_cart))
        .route("/reader/delete_cart/{cart_id}", delete(reader::delete_cart))
        .route("/reader/add_wishlist", post(reader::add_wishlist))
        .route("/reader/get_wishlist", get(reader::get_wishlist))
        .route(
            "/reader/delete_wishlist/{wishlist_id}",
            delete(reader::delete_wishlist),
        )
        // Files
        .route("/stream/{filename}", get(files::stream_book))
        .route("/cover/{filename}", get(files::book_cover))
        .merge(category_routes.clone());

    let upload_routes = Router::new()
        .route("/pub/upload_book", post(upload::upload_book))
        .route("/pub/update_book/{book_id}", put(upload::update_book));

    Router::new()
        .route("/health", get(files::health))
        .nest("/auth", register_routes.merge(login_routes))
        .nest("/book", book_routes)
        .nest("/category", category_routes)
        .nest("/files", upload_routes.clone())
        .nest("/upload", upload_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
