//! Publisher category and book management.

use super::{ApiJson, MessageResponse, get_publisher_id};
use crate::db::{Book, Category, format_timestamp};
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

/// Book as shown to its publisher.
#[derive(Debug, Serialize)]
pub struct BookView {
    book_id: i64,
    category_id: i64,
    title: String,
    author: String,
    isbn: String,
    language: String,
    genre: String,
    e_book_type: String,
    price: String,
    rental_price: String,
    description: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    epub_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover_image: Option<String>,
}

impl BookView {
    /// Listing form, without stored file names.
    fn summary(book: Book) -> Self {
        Self {
            epub_file: None,
            cover_image: None,
            ..Self::detail(book)
        }
    }

    /// Full form, including stored file names.
    fn detail(book: Book) -> Self {
        Self {
            book_id: book.book_id,
            category_id: book.category_id,
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            language: book.language,
            genre: book.genre,
            e_book_type: book.e_book_type,
            price: book.price,
            rental_price: book.rental_price,
            description: book.description,
            status: book.status.as_str().to_string(),
            created_at: format_timestamp(book.created_at),
            updated_at: format_timestamp(book.updated_at),
            epub_file: book.epub_file,
            cover_image: book.cover_image,
        }
    }
}

// ============================================================================
// CATEGORIES
// ============================================================================

/// Add category request.
#[derive(Debug, Deserialize)]
pub struct AddCategoryRequest {
    category_name: String,
    description: Option<String>,
}

/// Add category response.
#[derive(Debug, Serialize)]
pub struct AddCategoryResponse {
    message: String,
    category: String,
    category_id: i64,
}

/// Category entry.
#[derive(Debug, Serialize)]
pub struct CategoryView {
    category_id: i64,
    category_name: String,
    description: Option<String>,
    created_at: String,
    updated_time: String,
}

impl From<Category> for CategoryView {
    fn from(category: Category) -> Self {
        Self {
            category_id: category.category_id,
            category_name: category.category_name,
            description: category.description,
            created_at: format_timestamp(category.created_at),
            updated_time: format_timestamp(category.updated_time),
        }
    }
}

/// Category list response.
#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    categories: Vec<CategoryView>,
}

/// Books in one category.
#[derive(Debug, Serialize)]
pub struct CategoryBooksResponse {
    category_id: i64,
    category_name: String,
    books: Vec<BookView>,
}

/// Add a category.
pub async fn add_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<AddCategoryRequest>,
) -> Result<(StatusCode, Json<AddCategoryResponse>)> {
    let publisher_id = get_publisher_id(&state, &headers)?;

    let name = req.category_name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    }

    let category = state
        .db
        .create_category(publisher_id, name, req.description.as_deref())?;
    tracing::info!(
        publisher_id,
        category_id = category.category_id,
        "Added category"
    );

    Ok((
        StatusCode::CREATED,
        Json(AddCategoryResponse {
            message: "Category added successfully".to_string(),
            category: category.category_name,
            category_id: category.category_id,
        }),
    ))
}

/// List the publisher's categories.
pub async fn get_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CategoriesResponse>> {
    let publisher_id = get_publisher_id(&state, &headers)?;
    let categories = state.db.list_categories(publisher_id)?;

    Ok(Json(CategoriesResponse {
        categories: categories.into_iter().map(CategoryView::from).collect(),
    }))
}

/// Delete a category that has no books.
pub async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(category_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let publisher_id = get_publisher_id(&state, &headers)?;

    let not_found = || AppError::NotFound("Category not found or access denied".to_string());
    state
        .db
        .get_category(category_id, publisher_id)?
        .ok_or_else(not_found)?;

    if state.db.category_has_books(category_id)? {
        return Err(AppError::BadRequest(
            "Cannot delete category with associated books".to_string(),
        ));
    }

    if !state.db.delete_category(category_id, publisher_id)? {
        return Err(not_found());
    }
    tracing::info!(publisher_id, category_id, "Deleted category");

    Ok(Json(MessageResponse::new("Category deleted successfully")))
}

// ============================================================================
// BOOKS
// ============================================================================

/// List books in one of the publisher's categories.
pub async fn get_books_by_cat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(category_id): Path<i64>,
) -> Result<Json<CategoryBooksResponse>> {
    let publisher_id = get_publisher_id(&state, &headers)?;

    let category = state
        .db
        .get_category(category_id, publisher_id)?
        .ok_or_else(|| AppError::NotFound("Invalid category ID".to_string()))?;
    let books = state.db.list_category_books(category_id)?;

    Ok(Json(CategoryBooksResponse {
        category_id,
        category_name: category.category_name,
        books: books.into_iter().map(BookView::summary).collect(),
    }))
}

/// Get one of the publisher's books.
pub async fn get_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<i64>,
) -> Result<Json<BookView>> {
    let publisher_id = get_publisher_id(&state, &headers)?;

    let book = state
        .db
        .get_publisher_book(book_id, publisher_id)?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

    Ok(Json(BookView::detail(book)))
}

/// List all of the publisher's books. An empty catalogue is a 404.
pub async fn get_all_books(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookView>>> {
    let publisher_id = get_publisher_id(&state, &headers)?;

    let books = state.db.list_publisher_books(publisher_id)?;
    if books.is_empty() {
        return Err(AppError::NotFound(
            "No books found for this publisher".to_string(),
        ));
    }

    Ok(Json(books.into_iter().map(BookView::summary).collect()))
}

/// Delete a book, its dependent rows and its stored files.
pub async fn delete_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let publisher_id = get_publisher_id(&state, &headers)?;

    let removed = state
        .db
        .delete_book(book_id, publisher_id)?
        .ok_or_else(|| AppError::NotFound("Book not found or access denied".to_string()))?;

    for name in &removed.files {
        state.store.remove_book_file(name);
    }
    if let Some(cover) = &removed.cover_image {
        state.store.remove_cover(cover);
    }
    tracing::info!(publisher_id, book_id, files = removed.files.len(), "Deleted book");

    Ok(Json(MessageResponse::new(
        "Book and associated files deleted successfully",
    )))
}
