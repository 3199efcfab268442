//! Reader purchases, annotations, cart and wishlist.

use super::{ApiJson, MessageResponse, get_reader_id};
use crate::db::{Book, ListItem, ReaderList, format_timestamp};
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

/// Look up a book any reader may see.
fn require_book(state: &AppState, book_id: i64) -> Result<Book> {
    state
        .db
        .get_book(book_id)?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
}

// ============================================================================
// HIGHLIGHTS
// ============================================================================

/// Add highlight request.
#[derive(Debug, Deserialize)]
pub struct HighlightRequest {
    book_id: i64,
    text: String,
    highlight_range: String,
    color: Option<String>,
}

/// Highlight as returned after creation.
#[derive(Debug, Serialize)]
pub struct HighlightView {
    hl_id: i64,
    reader_id: i64,
    book_id: i64,
    text: String,
    highlight_range: String,
    color: String,
    created_at: String,
}

/// Add highlight response.
#[derive(Debug, Serialize)]
pub struct HighlightCreated {
    message: String,
    highlight: HighlightView,
}

/// Highlight list entry.
#[derive(Debug, Serialize)]
pub struct HighlightEntry {
    hl_id: i64,
    text: String,
    highlight_range: String,
    color: String,
}

/// Highlights for one book.
#[derive(Debug, Serialize)]
pub struct HighlightsResponse {
    reader_id: i64,
    book_id: i64,
    highlights: Vec<HighlightEntry>,
}

/// Add a highlight for the calling reader.
pub async fn add_highlight(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<HighlightRequest>,
) -> Result<(StatusCode, Json<HighlightCreated>)> {
    let reader_id = get_reader_id(&state, &headers)?;
    require_book(&state, req.book_id)?;

    let color = req
        .color
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("yellow");
    let hl = state
        .db
        .add_highlight(reader_id, req.book_id, &req.text, &req.highlight_range, color)?;
    tracing::info!(reader_id, book_id = hl.book_id, hl_id = hl.hl_id, "Added highlight");

    Ok((
        StatusCode::CREATED,
        Json(HighlightCreated {
            message: "Highlight added successfully".to_string(),
            highlight: HighlightView {
                hl_id: hl.hl_id,
                reader_id: hl.reader_id,
                book_id: hl.book_id,
                text: hl.text,
                highlight_range: hl.highlight_range,
                color: hl.color,
                created_at: format_timestamp(hl.created_at),
            },
        }),
    ))
}

/// List the calling reader's highlights for a book.
pub async fn get_highlights(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<i64>,
) -> Result<Json<HighlightsResponse>> {
    let reader_id = get_reader_id(&state, &headers)?;
    require_book(&state, book_id)?;

    let highlights = state
        .db
        .get_highlights(reader_id, book_id)?
        .into_iter()
        .map(|hl| HighlightEntry {
            hl_id: hl.hl_id,
            text: hl.text,
            highlight_range: hl.highlight_range,
            color: hl.color,
        })
        .collect();

    Ok(Json(HighlightsResponse {
        reader_id,
        book_id,
        highlights,
    }))
}

/// Delete one of the calling reader's highlights.
pub async fn delete_highlight(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(hl_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let reader_id = get_reader_id(&state, &headers)?;

    if !state.db.delete_highlight(hl_id, reader_id)? {
        return Err(AppError::NotFound("Highlight not found".to_string()));
    }
    tracing::info!(reader_id, hl_id, "Deleted highlight");

    Ok(Json(MessageResponse::new("Highlight deleted successfully")))
}

// ============================================================================
// NOTES
// ============================================================================

/// Add note request.
#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    book_id: i64,
    text: String,
    note_range: String,
}

/// Note as returned after creation.
#[derive(Debug, Serialize)]
pub struct NoteView {
    note_id: i64,
    reader_id: i64,
    book_id: i64,
    text: String,
    note_range: String,
    created_at: String,
}

/// Add note response.
#[derive(Debug, Serialize)]
pub struct NoteCreated {
    message: String,
    note: NoteView,
}

/// Note list entry.
#[derive(Debug, Serialize)]
pub struct NoteEntry {
    note_id: i64,
    text: String,
    note_range: String,
}

/// Notes for one book.
#[derive(Debug, Serialize)]
pub struct NotesResponse {
    reader_id: i64,
    book_id: i64,
    notes: Vec<NoteEntry>,
}

/// Add a note for the calling reader.
pub async fn add_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<NoteRequest>,
) -> Result<(StatusCode, Json<NoteCreated>)> {
    let reader_id = get_reader_id(&state, &headers)?;
    require_book(&state, req.book_id)?;

    let note = state
        .db
        .add_note(reader_id, req.book_id, &req.text, &req.note_range)?;
    tracing::info!(reader_id, book_id = note.book_id, note_id = note.note_id, "Added note");

    Ok((
        StatusCode::CREATED,
        Json(NoteCreated {
            message: "Note added successfully".to_string(),
            note: NoteView {
                note_id: note.note_id,
                reader_id: note.reader_id,
                book_id: note.book_id,
                text: note.text,
                note_range: note.note_range,
                created_at: format_timestamp(note.created_at),
            },
        }),
    ))
}

/// List the calling reader's notes for a book.
pub async fn get_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<i64>,
) -> Result<Json<NotesResponse>> {
    let reader_id = get_reader_id(&state, &headers)?;
    require_book(&state, book_id)?;

    let notes = state
        .db
        .get_notes(reader_id, book_id)?
        .into_iter()
        .map(|note| NoteEntry {
            note_id: note.note_id,
            text: note.text,
            note_range: note.note_range,
        })
        .collect();

    Ok(Json(NotesResponse {
        reader_id,
        book_id,
        notes,
    }))
}

/// Delete one of the calling reader's notes.
pub async fn delete_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(note_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let reader_id = get_reader_id(&state, &headers)?;

    if !state.db.delete_note(note_id, reader_id)? {
        return Err(AppError::NotFound("Note not found".to_string()));
    }
    tracing::info!(reader_id, note_id, "Deleted note");

    Ok(Json(MessageResponse::new("Note deleted successfully")))
}

// ============================================================================
// PURCHASES
// ============================================================================

/// Request naming a single book.
#[derive(Debug, Deserialize)]
pub struct BookRequest {
    book_id: Option<i64>,
}

impl BookRequest {
    fn book_id(&self) -> Result<i64> {
        self.book_id
            .ok_or_else(|| AppError::BadRequest("Book ID is required".to_string()))
    }
}

/// Purchase summary.
#[derive(Debug, Serialize)]
pub struct PurchaseView {
    bp_id: i64,
    book_id: i64,
    bookmark: i64,
}

/// Purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseCreated {
    message: String,
    purchase: PurchaseView,
}

/// Purchased book entry.
#[derive(Debug, Serialize)]
pub struct PurchasedBookView {
    book_id: i64,
    title: String,
    author: String,
    isbn: String,
    cover_image: Option<String>,
    file_path: Option<String>,
    purchase_date: String,
    bookmark: i64,
}

/// Purchased books response.
#[derive(Debug, Serialize)]
pub struct PurchasedBooksResponse {
    reader_id: i64,
    purchased_books: Vec<PurchasedBookView>,
}

/// Bookmark update request.
#[derive(Debug, Deserialize)]
pub struct BookmarkRequest {
    book_id: i64,
    bookmark: i64,
}

/// Bookmark update response.
#[derive(Debug, Serialize)]
pub struct BookmarkUpdated {
    message: String,
    purchase: PurchaseView,
}

/// Purchase a book.
pub async fn purchase_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<BookRequest>,
) -> Result<(StatusCode, Json<PurchaseCreated>)> {
    let reader_id = get_reader_id(&state, &headers)?;
    let book = require_book(&state, req.book_id()?)?;

    let purchase = state.db.create_purchase(reader_id, book.book_id)?;
    tracing::info!(reader_id, book_id = book.book_id, bp_id = purchase.bp_id, "Purchased book");

    Ok((
        StatusCode::CREATED,
        Json(PurchaseCreated {
            message: "Book purchased successfully".to_string(),
            purchase: PurchaseView {
                bp_id: purchase.bp_id,
                book_id: purchase.book_id,
                bookmark: purchase.bookmark,
            },
        }),
    ))
}

/// List the calling reader's purchased books.
pub async fn get_purchased_books(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PurchasedBooksResponse>> {
    let reader_id = get_reader_id(&state, &headers)?;

    let purchased_books = state
        .db
        .list_purchases(reader_id)?
        .into_iter()
        .map(|p| PurchasedBookView {
            book_id: p.book.book_id,
            title: p.book.title,
            author: p.book.author,
            isbn: p.book.isbn,
            cover_image: p.book.cover_image,
            file_path: p.book.epub_file,
            purchase_date: format_timestamp(p.purchase.purchase_date),
            bookmark: p.purchase.bookmark,
        })
        .collect();

    Ok(Json(PurchasedBooksResponse {
        reader_id,
        purchased_books,
    }))
}

/// Move the bookmark of a purchased book.
pub async fn update_bookmark(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<BookmarkRequest>,
) -> Result<Json<BookmarkUpdated>> {
    let reader_id = get_reader_id(&state, &headers)?;

    if !(0..=100).contains(&req.bookmark) {
        return Err(AppError::BadRequest(
            "Bookmark must be between 0 and 100".to_string(),
        ));
    }

    let purchase = state
        .db
        .update_bookmark(reader_id, req.book_id, req.bookmark)?
        .ok_or_else(|| AppError::NotFound("Purchase not found".to_string()))?;
    tracing::debug!(reader_id, book_id = req.book_id, bookmark = req.bookmark, "Moved bookmark");

    Ok(Json(BookmarkUpdated {
        message: "Bookmark updated successfully".to_string(),
        purchase: PurchaseView {
            bp_id: purchase.bp_id,
            book_id: purchase.book_id,
            bookmark: purchase.bookmark,
        },
    }))
}

// ============================================================================
// CATALOGUE
// ============================================================================

/// Book as shown to readers.
#[derive(Debug, Serialize)]
pub struct ReaderBookView {
    book_id: i64,
    title: String,
    author: String,
    isbn: String,
    file_path: Option<String>,
    cover_image: Option<String>,
    language: String,
    genre: String,
    e_book_type: String,
    price: String,
    rental_price: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

/// Get any book's details.
pub async fn get_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<i64>,
) -> Result<Json<ReaderBookView>> {
    get_reader_id(&state, &headers)?;
    let book = require_book(&state, book_id)?;

    Ok(Json(ReaderBookView {
        book_id: book.book_id,
        title: book.title,
        author: book.author,
        isbn: book.isbn,
        file_path: book.epub_file,
        cover_image: book.cover_image,
        language: book.language,
        genre: book.genre,
        e_book_type: book.e_book_type,
        price: book.price,
        rental_price: book.rental_price,
        description: book.description,
        created_at: format_timestamp(book.created_at),
        updated_at: format_timestamp(book.updated_at),
    }))
}

// ============================================================================
// CART AND WISHLIST
// ============================================================================

/// Cart entry.
#[derive(Debug, Serialize)]
pub struct CartEntry {
    cart_id: i64,
    book_id: i64,
    title: String,
    author: String,
    added_at: String,
}

/// Cart contents.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    cart: Vec<CartEntry>,
}

/// Wishlist entry.
#[derive(Debug, Serialize)]
pub struct WishlistEntry {
    wishlist_id: i64,
    book_id: i64,
    title: String,
    author: String,
    added_at: String,
}

/// Wishlist contents.
#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    wishlist: Vec<WishlistEntry>,
}

fn add_list_item(
    state: &AppState,
    headers: &HeaderMap,
    list: ReaderList,
    req: &BookRequest,
) -> Result<i64> {
    let reader_id = get_reader_id(state, headers)?;
    let book = require_book(state, req.book_id()?)?;

    let id = state.db.add_list_item(list, reader_id, book.book_id)?;
    tracing::info!(reader_id, book_id = book.book_id, list = ?list, id, "Added list item");
    Ok(id)
}

fn delete_list_item(state: &AppState, headers: &HeaderMap, list: ReaderList, id: i64) -> Result<bool> {
    let reader_id = get_reader_id(state, headers)?;
    let deleted = state.db.delete_list_item(list, id, reader_id)?;
    if deleted {
        tracing::info!(reader_id, list = ?list, id, "Deleted list item");
    }
    Ok(deleted)
}

fn list_items(state: &AppState, headers: &HeaderMap, list: ReaderList) -> Result<Vec<ListItem>> {
    let reader_id = get_reader_id(state, headers)?;
    state.db.list_items(list, reader_id)
}

/// Add a book to the cart.
pub async fn add_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<BookRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    add_list_item(&state, &headers, ReaderList::Cart, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Book added to cart successfully")),
    ))
}

/// Show the cart.
pub async fn get_cart(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CartResponse>> {
    let cart = list_items(&state, &headers, ReaderList::Cart)?
        .into_iter()
        .map(|item| CartEntry {
            cart_id: item.id,
            book_id: item.book_id,
            title: item.title,
            author: item.author,
            added_at: format_timestamp(item.added_at),
        })
        .collect();

    Ok(Json(CartResponse { cart }))
}

/// Remove a cart entry.
pub async fn delete_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cart_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    if !delete_list_item(&state, &headers, ReaderList::Cart, cart_id)? {
        return Err(AppError::NotFound("Cart item not found".to_string()));
    }
    Ok(Json(MessageResponse::new("Cart item deleted successfully")))
}

/// Add a book to the wishlist.
pub async fn add_wishlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<BookRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    add_list_item(&state, &headers, ReaderList::Wishlist, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Book added to wishlist successfully")),
    ))
}

/// Show the wishlist.
pub async fn get_wishlist(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WishlistResponse>> {
    let wishlist = list_items(&state, &headers, ReaderList::Wishlist)?
        .into_iter()
        .map(|item| WishlistEntry {
            wishlist_id: item.id,
            book_id: item.book_id,
            title: item.title,
            author: item.author,
            added_at: format_timestamp(item.added_at),
        })
        .collect();

    Ok(Json(WishlistResponse { wishlist }))
}

/// Remove a wishlist entry.
pub async fn delete_wishlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(wishlist_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    if !delete_list_item(&state, &headers, ReaderList::Wishlist, wishlist_id)? {
        return Err(AppError::NotFound("Wishlist item not found".to_string()));
    }
    Ok(Json(MessageResponse::new("Wishlist item deleted successfully")))
}
