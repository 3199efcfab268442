//! Multipart book upload and update.

use super::get_publisher_id;
use crate::config::{FileKind, extension_of};
use crate::db::{Book, BookDetails, BookFiles};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::storage::{PlacedFile, StagedFile, book_file_name, cover_file_name};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use std::collections::HashMap;

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    message: String,
    book_id: i64,
    file_name: Option<String>,
    cover_image_name: Option<String>,
    status: String,
}

/// Update response.
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    message: String,
    book_id: i64,
    file_name: Option<String>,
    cover_image_name: Option<String>,
}

#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    data: Bytes,
}

/// Parsed `multipart/form-data` body of an upload or update.
#[derive(Debug, Default)]
struct BookForm {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
    cover_image: Option<UploadedFile>,
}

impl BookForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match name.as_str() {
                "file" | "cover_image" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let data = field.bytes().await?;
                    let upload = Some(UploadedFile { file_name, data });
                    if name == "file" {
                        form.file = upload;
                    } else {
                        form.cover_image = upload;
                    }
                }
                _ => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed, non-empty text field.
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Cover image, if one was actually selected.
    fn cover(&self) -> Option<&UploadedFile> {
        self.cover_image
            .as_ref()
            .filter(|c| !c.file_name.is_empty())
    }
}

/// Lower-cased extension of an accepted content file.
fn content_extension(file_name: &str) -> Result<String> {
    FileKind::from_filename(file_name)
        .and_then(|_| extension_of(file_name))
        .ok_or_else(|| AppError::BadRequest("Invalid file type".to_string()))
}

/// Lower-cased extension of an accepted cover image.
fn cover_extension(file_name: &str) -> Result<String> {
    match FileKind::from_filename(file_name) {
        Some(kind) if kind.is_image() => extension_of(file_name)
            .ok_or_else(|| AppError::BadRequest("Invalid cover image type".to_string())),
        _ => Err(AppError::BadRequest("Invalid cover image type".to_string())),
    }
}

/// Normalise a non-negative decimal price to two places.
fn parse_price(raw: &str) -> Result<String> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(format!("{:.2}", value)),
        _ => Err(AppError::BadRequest(format!("Invalid price: {}", raw))),
    }
}

/// Parse a category ID and check it belongs to the publisher.
fn parse_category(state: &AppState, raw: &str, publisher_id: i64) -> Result<i64> {
    let invalid = || AppError::BadRequest("Invalid category ID".to_string());
    let category_id = raw.trim().parse::<i64>().map_err(|_| invalid())?;
    state
        .db
        .get_category(category_id, publisher_id)?
        .ok_or_else(invalid)?;
    Ok(category_id)
}

/// Move staged files to the names recorded on a new book. If that fails
/// after the rows were committed, the book is deleted again so no row points
/// at a missing file.
fn commit_new_book(
    state: &AppState,
    book: &Book,
    content: StagedFile,
    cover: Option<StagedFile>,
) -> Result<()> {
    let result = match (&book.epub_file, &book.cover_image, cover) {
        (Some(file), Some(image), Some(cover)) => {
            content.commit(file).and_then(|()| cover.commit(image))
        }
        (Some(file), _, _) => content.commit(file),
        (None, _, _) => Err(AppError::Internal(format!(
            "Book {} was stored without a file",
            book.book_id
        ))),
    };

    if let Err(e) = result {
        tracing::error!(book_id = book.book_id, error = %e, "Failed to move uploaded files into place");
        if let Some(removed) = state.db.delete_book(book.book_id, book.publisher_id)? {
            for name in &removed.files {
                state.store.remove_book_file(name);
            }
            if let Some(cover) = &removed.cover_image {
                state.store.remove_cover(cover);
            }
        }
        return Err(e);
    }
    Ok(())
}

/// Move a staged replacement to `name`. A name the current row already
/// references is overwritten in place and kept even if the update rolls back.
fn place_replacement(
    staged: Option<(StagedFile, String)>,
    current: Option<&str>,
) -> Result<Option<PlacedFile>> {
    let Some((staged, name)) = staged else {
        return Ok(None);
    };
    let placed = staged.place(&name)?;
    if current == Some(name.as_str()) {
        placed.keep();
        return Ok(None);
    }
    Ok(Some(placed))
}

/// Upload a new book with its content file and an optional cover.
pub async fn upload_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let publisher_id = get_publisher_id(&state, &headers)?;
    let form = BookForm::read(multipart?).await?;

    let (Some(title), Some(author), Some(isbn), Some(category)) = (
        form.text("title"),
        form.text("author"),
        form.text("isbn"),
        form.text("category_id"),
    ) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };
    let category_id = parse_category(&state, category, publisher_id)?;

    let file = form
        .file
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    if file.file_name.is_empty() {
        return Err(AppError::BadRequest("No file selected".to_string()));
    }
    let ext = content_extension(&file.file_name)?;

    let cover = form
        .cover()
        .map(|c| cover_extension(&c.file_name).map(|ext| (c, ext)))
        .transpose()?;

    let details = BookDetails {
        category_id,
        title: title.to_string(),
        author: author.to_string(),
        isbn: isbn.to_string(),
        language: form.text("language").unwrap_or_default().to_string(),
        genre: form.text("genre").unwrap_or_default().to_string(),
        e_book_type: form.text("e_book_type").unwrap_or("EPUB").to_string(),
        price: parse_price(form.text("price").unwrap_or("0"))?,
        rental_price: parse_price(form.text("rental_price").unwrap_or("0"))?,
        description: form.text("description").map(str::to_string),
    };

    let blob = state.cipher.encrypt(&file.data)?;
    let content = state.store.stage_book_file(&blob).await?;
    let staged_cover = match &cover {
        Some((c, _)) => Some(state.store.stage_cover(&c.data).await?),
        None => None,
    };

    let book = state.db.create_book(publisher_id, &details, |book_id| {
        Ok(BookFiles {
            epub_file: Some(book_file_name(book_id, &ext)),
            cover_image: cover.as_ref().map(|(_, ext)| cover_file_name(book_id, ext)),
        })
    })?;

    commit_new_book(&state, &book, content, staged_cover)?;

    tracing::info!(
        publisher_id,
        book_id = book.book_id,
        status = book.status.as_str(),
        size = file.data.len(),
        "Uploaded book"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Book uploaded successfully".to_string(),
            book_id: book.book_id,
            file_name: book.epub_file,
            cover_image_name: book.cover_image,
            status: book.status.as_str().to_string(),
        }),
    ))
}

/// Update a book's metadata and optionally replace its files.
///
/// Every field is optional; absent fields keep their current value.
pub async fn update_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<i64>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UpdateResponse>> {
    let publisher_id = get_publisher_id(&state, &headers)?;
    let form = BookForm::read(multipart?).await?;

    let not_found = || AppError::NotFound("Book not found".to_string());
    let book = state
        .db
        .get_publisher_book(book_id, publisher_id)?
        .ok_or_else(not_found)?;

    let mut details = BookDetails::of(&book);
    if let Some(raw) = form.text("category_id") {
        details.category_id = parse_category(&state, raw, publisher_id)?;
    }
    for (name, target) in [
        ("title", &mut details.title),
        ("author", &mut details.author),
        ("isbn", &mut details.isbn),
        ("language", &mut details.language),
        ("genre", &mut details.genre),
        ("e_book_type", &mut details.e_book_type),
    ] {
        if let Some(value) = form.text(name) {
            *target = value.to_string();
        }
    }
    if let Some(raw) = form.text("price") {
        details.price = parse_price(raw)?;
    }
    if let Some(raw) = form.text("rental_price") {
        details.rental_price = parse_price(raw)?;
    }
    if let Some(description) = form.text("description") {
        details.description = Some(description.to_string());
    }

    let content = match form.file.as_ref().filter(|f| !f.file_name.is_empty()) {
        Some(file) => {
            let ext = content_extension(&file.file_name)?;
            let blob = state.cipher.encrypt(&file.data)?;
            let staged = state.store.stage_book_file(&blob).await?;
            Some((staged, book_file_name(book_id, &ext)))
        }
        None => None,
    };
    let cover = match form.cover() {
        Some(c) => {
            let ext = cover_extension(&c.file_name)?;
            let staged = state.store.stage_cover(&c.data).await?;
            Some((staged, cover_file_name(book_id, &ext)))
        }
        None => None,
    };

    let files = BookFiles {
        epub_file: content.as_ref().map(|(_, name)| name.clone()),
        cover_image: cover.as_ref().map(|(_, name)| name.clone()),
    };
    let store = &state.store;
    let updated = state
        .db
        .update_book(
            book_id,
            publisher_id,
            &details,
            &files,
            |current| {
                let content = place_replacement(content, current.epub_file.as_deref())?;
                let cover = place_replacement(cover, current.cover_image.as_deref())?;
                Ok((content, cover))
            },
            |previous, updated, (content, cover)| {
                content.into_iter().chain(cover).for_each(PlacedFile::keep);
                if let Some(old) = &previous.epub_file
                    && updated.epub_file.as_ref() != Some(old)
                {
                    store.remove_book_file(old);
                }
                if let Some(old) = &previous.cover_image
                    && updated.cover_image.as_ref() != Some(old)
                {
                    store.remove_cover(old);
                }
            },
        )?
        .ok_or_else(not_found)?;

    tracing::info!(
        publisher_id,
        book_id,
        new_file = files.epub_file.is_some(),
        new_cover = files.cover_image.is_some(),
        "Updated book"
    );

    Ok(Json(UpdateResponse {
        message: "Book updated successfully".to_string(),
        book_id,
        file_name: updated.epub_file,
        cover_image_name: updated.cover_image,
    }))
}
