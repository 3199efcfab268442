mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publisher account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    /// Publisher ID.
    pub publisher_id: i64,
    /// Display name.
    pub name: String,
    /// Login email (unique).
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Contact phone.
    pub phone: String,
    /// Free-form location.
    pub geo_location: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Signup timestamp.
    pub signup_date: i64,
}

/// Reader account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reader {
    /// Reader ID.
    pub reader_id: i64,
    /// Display name.
    pub name: String,
    /// Login email (unique).
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Contact phone.
    pub phone: String,
    /// Free-form location.
    pub geo_location: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Signup timestamp.
    pub signup_date: i64,
}

/// Fields needed to create either kind of account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Contact phone.
    pub phone: String,
    /// Free-form location.
    pub geo_location: Option<String>,
    /// Postal address.
    pub address: Option<String>,
}

/// Book category owned by a publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category ID.
    pub category_id: i64,
    /// Owning publisher.
    pub publisher_id: i64,
    /// Category name.
    pub category_name: String,
    /// Description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_time: i64,
}

/// Publication status of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    /// Visible in the catalogue.
    Live,
    /// Awaiting review (title collides with an existing book).
    Pending,
}

impl BookStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Live => "live",
            BookStatus::Pending => "pending",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => BookStatus::Pending,
            _ => BookStatus::Live,
        }
    }
}

/// Book row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub book_id: i64,
    /// Owning publisher.
    pub publisher_id: i64,
    /// Category (owned by the same publisher).
    pub category_id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN.
    pub isbn: String,
    /// Stored name of the encrypted content file.
    pub epub_file: Option<String>,
    /// Stored name of the cover image.
    pub cover_image: Option<String>,
    /// Language.
    pub language: String,
    /// Genre.
    pub genre: String,
    /// E-book type label (EPUB, PDF, ...).
    pub e_book_type: String,
    /// Sale price as a decimal string.
    pub price: String,
    /// Rental price as a decimal string.
    pub rental_price: String,
    /// Description.
    pub description: Option<String>,
    /// Publication status.
    pub status: BookStatus,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Editable book metadata, used for both creation and update.
#[derive(Debug, Clone)]
pub struct BookDetails {
    /// Category.
    pub category_id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN.
    pub isbn: String,
    /// Language.
    pub language: String,
    /// Genre.
    pub genre: String,
    /// E-book type label.
    pub e_book_type: String,
    /// Sale price.
    pub price: String,
    /// Rental price.
    pub rental_price: String,
    /// Description.
    pub description: Option<String>,
}

impl BookDetails {
    /// Current metadata of an existing book.
    pub fn of(book: &Book) -> Self {
        Self {
            category_id: book.category_id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            language: book.language.clone(),
            genre: book.genre.clone(),
            e_book_type: book.e_book_type.clone(),
            price: book.price.clone(),
            rental_price: book.rental_price.clone(),
            description: book.description.clone(),
        }
    }
}

/// Stored file names attached to a book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFiles {
    /// Encrypted content file (None keeps the current one on update).
    pub epub_file: Option<String>,
    /// Cover image (None keeps the current one on update).
    pub cover_image: Option<String>,
}

/// File row linking a stored blob to a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookFile {
    /// File ID.
    pub file_id: i64,
    /// Owning publisher.
    pub publisher_id: i64,
    /// Book.
    pub book_id: i64,
    /// Stored name relative to the files directory.
    pub file_path: String,
    /// Upload timestamp.
    pub uploaded_at: i64,
}

/// Stored names that belonged to a deleted book.
#[derive(Debug, Clone, Default)]
pub struct RemovedBook {
    /// Encrypted content files.
    pub files: Vec<String>,
    /// Cover image.
    pub cover_image: Option<String>,
}

/// Reader highlight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    /// Highlight ID.
    pub hl_id: i64,
    /// Reader.
    pub reader_id: i64,
    /// Book.
    pub book_id: i64,
    /// Highlighted text.
    pub text: String,
    /// Position range descriptor.
    pub highlight_range: String,
    /// Color tag.
    pub color: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Reader note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Note ID.
    pub note_id: i64,
    /// Reader.
    pub reader_id: i64,
    /// Book.
    pub book_id: i64,
    /// Note text.
    pub text: String,
    /// Position range descriptor.
    pub note_range: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Purchase record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    /// Purchase ID.
    pub bp_id: i64,
    /// Reader.
    pub reader_id: i64,
    /// Book.
    pub book_id: i64,
    /// Reading progress, 0 to 100.
    pub bookmark: i64,
    /// Purchase timestamp.
    pub purchase_date: i64,
}

/// A purchase joined with its book.
#[derive(Debug, Clone)]
pub struct PurchasedBook {
    /// Purchase record.
    pub purchase: Purchase,
    /// Purchased book.
    pub book: Book,
}

/// Which reader list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderList {
    /// Shopping cart.
    Cart,
    /// Wishlist.
    Wishlist,
}

impl ReaderList {
    fn table(&self) -> &'static str {
        match self {
            ReaderList::Cart => "cart",
            ReaderList::Wishlist => "wishlist",
        }
    }

    fn id_column(&self) -> &'static str {
        match self {
            ReaderList::Cart => "cart_id",
            ReaderList::Wishlist => "wishlist_id",
        }
    }
}

/// Cart or wishlist entry joined with its book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
    /// Entry ID.
    pub id: i64,
    /// Book.
    pub book_id: i64,
    /// Book title.
    pub title: String,
    /// Book author.
    pub author: String,
    /// When the entry was added.
    pub added_at: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp(ts: i64) -> String {
    timestamp_to_datetime(ts)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
