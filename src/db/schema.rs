use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const BOOK_COLUMNS: &str = "b.book_id, b.publisher_id, b.category_id, b.title, b.author, b.isbn, \
     b.epub_file, b.cover_image, b.language, b.genre, b.e_book_type, b.price, b.rental_price, \
     b.description, b.status, b.created_at, b.updated_at";

fn book_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Book> {
    let status: String = row.get(offset + 14)?;
    Ok(Book {
        book_id: row.get(offset)?,
        publisher_id: row.get(offset + 1)?,
        category_id: row.get(offset + 2)?,
        title: row.get(offset + 3)?,
        author: row.get(offset + 4)?,
        isbn: row.get(offset + 5)?,
        epub_file: row.get(offset + 6)?,
        cover_image: row.get(offset + 7)?,
        language: row.get(offset + 8)?,
        genre: row.get(offset + 9)?,
        e_book_type: row.get(offset + 10)?,
        price: row.get(offset + 11)?,
        rental_price: row.get(offset + 12)?,
        description: row.get(offset + 13)?,
        status: BookStatus::parse(&status),
        created_at: row.get(offset + 15)?,
        updated_at: row.get(offset + 16)?,
    })
}

fn query_book(conn: &Connection, book_id: i64) -> rusqlite::Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {} FROM books b WHERE b.book_id = ?1", BOOK_COLUMNS),
        params![book_id],
        |row| book_from_row(row, 0),
    )
    .optional()
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        category_id: row.get(0)?,
        publisher_id: row.get(1)?,
        category_name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_time: row.get(5)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    e.to_string().contains("UNIQUE constraint")
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Publisher accounts
            CREATE TABLE IF NOT EXISTS publishers (
                publisher_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                phone TEXT NOT NULL,
                geo_location TEXT,
                address TEXT,
                signup_date INTEGER NOT NULL
            );

            -- Reader accounts
            CREATE TABLE IF NOT EXISTS readers (
                reader_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                phone TEXT NOT NULL,
                geo_location TEXT,
                address TEXT,
                signup_date INTEGER NOT NULL
            );

            -- Categories table
            CREATE TABLE IF NOT EXISTS categories (
                category_id INTEGER PRIMARY KEY AUTOINCREMENT,
                publisher_id INTEGER NOT NULL,
                category_name TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL,
                updated_time INTEGER NOT NULL,
                FOREIGN KEY (publisher_id) REFERENCES publishers(publisher_id) ON DELETE CASCADE
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                book_id INTEGER PRIMARY KEY AUTOINCREMENT,
                publisher_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                isbn TEXT NOT NULL,
                epub_file TEXT,
                cover_image TEXT,
                language TEXT NOT NULL DEFAULT '',
                genre TEXT NOT NULL DEFAULT '',
                e_book_type TEXT NOT NULL DEFAULT 'EPUB',
                price TEXT NOT NULL DEFAULT '0',
                rental_price TEXT NOT NULL DEFAULT '0',
                description TEXT,
                status TEXT NOT NULL DEFAULT 'live',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (publisher_id) REFERENCES publishers(publisher_id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(category_id) ON DELETE RESTRICT
            );

            -- Stored book files
            CREATE TABLE IF NOT EXISTS files (
                file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                publisher_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                file_path TEXT NOT NULL UNIQUE,
                uploaded_at INTEGER NOT NULL,
                FOREIGN KEY (publisher_id) REFERENCES publishers(publisher_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            );

            -- Highlights table
            CREATE TABLE IF NOT EXISTS highlights (
                hl_id INTEGER PRIMARY KEY AUTOINCREMENT,
                reader_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                highlight_range TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT 'yellow',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (reader_id) REFERENCES readers(reader_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            );

            -- Notes table
            CREATE TABLE IF NOT EXISTS notes (
                note_id INTEGER PRIMARY KEY AUTOINCREMENT,
                reader_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                note_range TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (reader_id) REFERENCES readers(reader_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            );

            -- Purchases table
            CREATE TABLE IF NOT EXISTS books_purchased (
                bp_id INTEGER PRIMARY KEY AUTOINCREMENT,
                reader_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                bookmark INTEGER NOT NULL DEFAULT 0 CHECK (bookmark BETWEEN 0 AND 100),
                purchase_date INTEGER NOT NULL,
                UNIQUE (reader_id, book_id),
                FOREIGN KEY (reader_id) REFERENCES readers(reader_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            );

            -- Cart table
            CREATE TABLE IF NOT EXISTS cart (
                cart_id INTEGER PRIMARY KEY AUTOINCREMENT,
                reader_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                FOREIGN KEY (reader_id) REFERENCES readers(reader_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            );

            -- Wishlist table
            CREATE TABLE IF NOT EXISTS wishlist (
                wishlist_id INTEGER PRIMARY KEY AUTOINCREMENT,
                reader_id INTEGER NOT NULL,
                book_id INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                FOREIGN KEY (reader_id) REFERENCES readers(reader_id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_categories_publisher ON categories(publisher_id);
            CREATE INDEX IF NOT EXISTS idx_books_publisher ON books(publisher_id);
            CREATE INDEX IF NOT EXISTS idx_books_category ON books(category_id);
            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
            CREATE INDEX IF NOT EXISTS idx_files_book ON files(book_id);
            CREATE INDEX IF NOT EXISTS idx_highlights_reader_book ON highlights(reader_id, book_id);
            CREATE INDEX IF NOT EXISTS idx_notes_reader_book ON notes(reader_id, book_id);
            CREATE INDEX IF NOT EXISTS idx_cart_reader ON cart(reader_id);
            CREATE INDEX IF NOT EXISTS idx_wishlist_reader ON wishlist(reader_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== ACCOUNT OPERATIONS ==========

    fn insert_account(&self, table: &str, account: &NewAccount) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (name, email, password_hash, phone, geo_location, address, signup_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                table
            ),
            params![
                account.name,
                account.email,
                account.password_hash,
                account.phone,
                account.geo_location,
                account.address,
                now_timestamp(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Email already registered".to_string())
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    /// Create a publisher account, returning its ID.
    pub fn create_publisher(&self, account: &NewAccount) -> Result<i64> {
        self.insert_account("publishers", account)
    }

    /// Create a reader account, returning its ID.
    pub fn create_reader(&self, account: &NewAccount) -> Result<i64> {
        self.insert_account("readers", account)
    }

    fn query_publisher(&self, column: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Publisher>> {
        let conn = self.conn.lock();
        let publisher = conn
            .query_row(
                &format!(
                    "SELECT publisher_id, name, email, password_hash, phone, geo_location, address, signup_date
                     FROM publishers WHERE {} = ?1",
                    column
                ),
                [value],
                |row| {
                    Ok(Publisher {
                        publisher_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        password_hash: row.get(3)?,
                        phone: row.get(4)?,
                        geo_location: row.get(5)?,
                        address: row.get(6)?,
                        signup_date: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(publisher)
    }

    /// Get publisher by email.
    pub fn get_publisher_by_email(&self, email: &str) -> Result<Option<Publisher>> {
        self.query_publisher("email", &email)
    }

    /// Get publisher by ID.
    pub fn get_publisher(&self, publisher_id: i64) -> Result<Option<Publisher>> {
        self.query_publisher("publisher_id", &publisher_id)
    }

    fn query_reader(&self, column: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Reader>> {
        let conn = self.conn.lock();
        let reader = conn
            .query_row(
                &format!(
                    "SELECT reader_id, name, email, password_hash, phone, geo_location, address, signup_date
                     FROM readers WHERE {} = ?1",
                    column
                ),
                [value],
                |row| {
                    Ok(Reader {
                        reader_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        password_hash: row.get(3)?,
                        phone: row.get(4)?,
                        geo_location: row.get(5)?,
                        address: row.get(6)?,
                        signup_date: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(reader)
    }

    /// Get reader by email.
    pub fn get_reader_by_email(&self, email: &str) -> Result<Option<Reader>> {
        self.query_reader("email", &email)
    }

    /// Get reader by ID.
    pub fn get_reader(&self, reader_id: i64) -> Result<Option<Reader>> {
        self.query_reader("reader_id", &reader_id)
    }

    /// Count rows in a table (used by tests and diagnostics).
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        const TABLES: [&str; 10] = [
            "publishers",
            "readers",
            "categories",
            "books",
            "files",
            "highlights",
            "notes",
            "books_purchased",
            "cart",
            "wishlist",
        ];
        if !TABLES.contains(&table) {
            return Err(AppError::Internal(format!("Unknown table: {}", table)));
        }

        let conn = self.conn.lock();
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    // ========== CATEGORY OPERATIONS ==========

    /// Create a category for a publisher.
    pub fn create_category(
        &self,
        publisher_id: i64,
        category_name: &str,
        description: Option<&str>,
    ) -> Result<Category> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO categories (publisher_id, category_name, description, created_at, updated_time)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![publisher_id, category_name, description, now],
        )?;

        Ok(Category {
            category_id: conn.last_insert_rowid(),
            publisher_id,
            category_name: category_name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_time: now,
        })
    }

    /// List a publisher's categories.
    pub fn list_categories(&self, publisher_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT category_id, publisher_id, category_name, description, created_at, updated_time
             FROM categories WHERE publisher_id = ?1 ORDER BY category_id",
        )?;

        let categories = stmt
            .query_map(params![publisher_id], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Get a category if it belongs to the publisher.
    pub fn get_category(&self, category_id: i64, publisher_id: i64) -> Result<Option<Category>> {
        let conn = self.conn.lock();
        let category = conn
            .query_row(
                "SELECT category_id, publisher_id, category_name, description, created_at, updated_time
                 FROM categories WHERE category_id = ?1 AND publisher_id = ?2",
                params![category_id, publisher_id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    /// Check whether any book uses the category.
    pub fn category_has_books(&self, category_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let exists = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM books WHERE category_id = ?1)",
            params![category_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete a publisher's category.
    pub fn delete_category(&self, category_id: i64, publisher_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM categories WHERE category_id = ?1 AND publisher_id = ?2",
            params![category_id, publisher_id],
        )?;
        Ok(rows > 0)
    }

    // ========== BOOK OPERATIONS ==========

    /// Create a book and its file row in one transaction.
    ///
    /// `attach` receives the new book ID and returns the stored names to
    /// record. If it fails, nothing is committed.
    pub fn create_book(
        &self,
        publisher_id: i64,
        details: &BookDetails,
        attach: impl FnOnce(i64) -> Result<BookFiles>,
    ) -> Result<Book> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = now_timestamp();

        let title_taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM books WHERE title = ?1)",
            params![details.title],
            |row| row.get(0),
        )?;
        let status = if title_taken {
            BookStatus::Pending
        } else {
            BookStatus::Live
        };

        tx.execute(
            "INSERT INTO books (publisher_id, category_id, title, author, isbn, language, genre,
                                e_book_type, price, rental_price, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                publisher_id,
                details.category_id,
                details.title,
                details.author,
                details.isbn,
                details.language,
                details.genre,
                details.e_book_type,
                details.price,
                details.rental_price,
                details.description,
                status.as_str(),
                now,
            ],
        )?;
        let book_id = tx.last_insert_rowid();

        let files = attach(book_id)?;

        tx.execute(
            "UPDATE books SET epub_file = ?1, cover_image = ?2 WHERE book_id = ?3",
            params![files.epub_file, files.cover_image, book_id],
        )?;
        if let Some(path) = &files.epub_file {
            tx.execute(
                "INSERT INTO files (publisher_id, book_id, file_path, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![publisher_id, book_id, path, now],
            )?;
        }

        let book = query_book(&tx, book_id)?
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished during insert", book_id)))?;
        tx.commit()?;

        Ok(book)
    }

    /// Update a publisher's book metadata and, optionally, its stored files.
    ///
    /// Both callbacks run with the connection locked, so concurrent updates
    /// of one book swap their files one at a time. `place` receives the row
    /// as it was before the update and runs last inside the transaction; if
    /// the commit fails, whatever it returned is dropped. `retire` runs after
    /// the commit with the previous and the updated row.
    ///
    /// Returns the updated book, or None if the book is not the publisher's.
    pub fn update_book<T>(
        &self,
        book_id: i64,
        publisher_id: i64,
        details: &BookDetails,
        files: &BookFiles,
        place: impl FnOnce(&Book) -> Result<T>,
        retire: impl FnOnce(&Book, &Book, T),
    ) -> Result<Option<Book>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = now_timestamp();

        let Some(current) = query_book(&tx, book_id)?.filter(|b| b.publisher_id == publisher_id)
        else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE books SET category_id = ?1, title = ?2, author = ?3, isbn = ?4, language = ?5,
                              genre = ?6, e_book_type = ?7, price = ?8, rental_price = ?9,
                              description = ?10, epub_file = COALESCE(?11, epub_file),
                              cover_image = COALESCE(?12, cover_image), updated_at = ?13
             WHERE book_id = ?14",
            params![
                details.category_id,
                details.title,
                details.author,
                details.isbn,
                details.language,
                details.genre,
                details.e_book_type,
                details.price,
                details.rental_price,
                details.description,
                files.epub_file,
                files.cover_image,
                now,
                book_id,
            ],
        )?;

        if let Some(path) = &files.epub_file {
            // The canonical file row follows the content file.
            let updated = tx.execute(
                "UPDATE files SET file_path = ?1, uploaded_at = ?2
                 WHERE file_id = (SELECT MIN(file_id) FROM files WHERE book_id = ?3)",
                params![path, now, book_id],
            )?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO files (publisher_id, book_id, file_path, uploaded_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![publisher_id, book_id, path, now],
                )?;
            }
        }

        let book = query_book(&tx, book_id)?
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished during update", book_id)))?;
        let placed = place(&current)?;
        tx.commit()?;

        retire(&current, &book, placed);
        Ok(Some(book))
    }

    /// Get any book by ID.
    pub fn get_book(&self, book_id: i64) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        Ok(query_book(&conn, book_id)?)
    }

    /// Get a book if it belongs to the publisher.
    pub fn get_publisher_book(&self, book_id: i64, publisher_id: i64) -> Result<Option<Book>> {
        Ok(self
            .get_book(book_id)?
            .filter(|book| book.publisher_id == publisher_id))
    }

    fn query_books(&self, filter: &str, value: i64) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM books b WHERE {} = ?1 ORDER BY b.book_id",
            BOOK_COLUMNS, filter
        ))?;

        let books = stmt
            .query_map(params![value], |row| book_from_row(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(books)
    }

    /// List a publisher's books.
    pub fn list_publisher_books(&self, publisher_id: i64) -> Result<Vec<Book>> {
        self.query_books("b.publisher_id", publisher_id)
    }

    /// List books in a category.
    pub fn list_category_books(&self, category_id: i64) -> Result<Vec<Book>> {
        self.query_books("b.category_id", category_id)
    }

    /// Delete a publisher's book and every row depending on it.
    ///
    /// Returns the stored names the caller should remove from disk, or None
    /// if the book is not the publisher's.
    pub fn delete_book(&self, book_id: i64, publisher_id: i64) -> Result<Option<RemovedBook>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let stored: Option<(Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT epub_file, cover_image FROM books WHERE book_id = ?1 AND publisher_id = ?2",
                params![book_id, publisher_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((epub_file, cover_image)) = stored else {
            return Ok(None);
        };

        let mut files: Vec<String> = {
            let mut stmt = tx.prepare("SELECT file_path FROM files WHERE book_id = ?1")?;
            stmt.query_map(params![book_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        if let Some(epub_file) = epub_file
            && !files.contains(&epub_file)
        {
            files.push(epub_file);
        }

        // Files, annotations, purchases and list entries cascade.
        tx.execute("DELETE FROM books WHERE book_id = ?1", params![book_id])?;
        tx.commit()?;

        Ok(Some(RemovedBook { files, cover_image }))
    }

    /// Look up a stored book file by name.
    pub fn find_book_file(&self, file_path: &str) -> Result<Option<BookFile>> {
        let conn = self.conn.lock();
        let file = conn
            .query_row(
                "SELECT file_id, publisher_id, book_id, file_path, uploaded_at
                 FROM files WHERE file_path = ?1",
                params![file_path],
                |row| {
                    Ok(BookFile {
                        file_id: row.get(0)?,
                        publisher_id: row.get(1)?,
                        book_id: row.get(2)?,
                        file_path: row.get(3)?,
                        uploaded_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(file)
    }

    /// Find the book whose cover has the given stored name.
    pub fn find_book_by_cover(&self, cover_image: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        let book = conn
            .query_row(
                &format!("SELECT {} FROM books b WHERE b.cover_image = ?1", BOOK_COLUMNS),
                params![cover_image],
                |row| book_from_row(row, 0),
            )
            .optional()?;
        Ok(book)
    }

    // ========== ANNOTATION OPERATIONS ==========

    /// Add a highlight.
    pub fn add_highlight(
        &self,
        reader_id: i64,
        book_id: i64,
        text: &str,
        highlight_range: &str,
        color: &str,
    ) -> Result<Highlight> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO highlights (reader_id, book_id, text, highlight_range, color, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![reader_id, book_id, text, highlight_range, color, now],
        )?;

        Ok(Highlight {
            hl_id: conn.last_insert_rowid(),
            reader_id,
            book_id,
            text: text.to_string(),
            highlight_range: highlight_range.to_string(),
            color: color.to_string(),
            created_at: now,
        })
    }

    /// Get a reader's highlights for a book.
    pub fn get_highlights(&self, reader_id: i64, book_id: i64) -> Result<Vec<Highlight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT hl_id, reader_id, book_id, text, highlight_range, color, created_at
             FROM highlights WHERE reader_id = ?1 AND book_id = ?2 ORDER BY hl_id",
        )?;

        let highlights = stmt
            .query_map(params![reader_id, book_id], |row| {
                Ok(Highlight {
                    hl_id: row.get(0)?,
                    reader_id: row.get(1)?,
                    book_id: row.get(2)?,
                    text: row.get(3)?,
                    highlight_range: row.get(4)?,
                    color: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(highlights)
    }

    /// Delete a reader's highlight.
    pub fn delete_highlight(&self, hl_id: i64, reader_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM highlights WHERE hl_id = ?1 AND reader_id = ?2",
            params![hl_id, reader_id],
        )?;
        Ok(rows > 0)
    }

    /// Add a note.
    pub fn add_note(&self, reader_id: i64, book_id: i64, text: &str, note_range: &str) -> Result<Note> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO notes (reader_id, book_id, text, note_range, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![reader_id, book_id, text, note_range, now],
        )?;

        Ok(Note {
            note_id: conn.last_insert_rowid(),
            reader_id,
            book_id,
            text: text.to_string(),
            note_range: note_range.to_string(),
            created_at: now,
        })
    }

    /// Get a reader's notes for a book.
    pub fn get_notes(&self, reader_id: i64, book_id: i64) -> Result<Vec<Note>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT note_id, reader_id, book_id, text, note_range, created_at
             FROM notes WHERE reader_id = ?1 AND book_id = ?2 ORDER BY note_id",
        )?;

        let notes = stmt
            .query_map(params![reader_id, book_id], |row| {
                Ok(Note {
                    note_id: row.get(0)?,
                    reader_id: row.get(1)?,
                    book_id: row.get(2)?,
                    text: row.get(3)?,
                    note_range: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Delete a reader's note.
    pub fn delete_note(&self, note_id: i64, reader_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM notes WHERE note_id = ?1 AND reader_id = ?2",
            params![note_id, reader_id],
        )?;
        Ok(rows > 0)
    }

    // ========== PURCHASE OPERATIONS ==========

    /// Record a purchase. Fails with a bad request if the reader already owns the book.
    pub fn create_purchase(&self, reader_id: i64, book_id: i64) -> Result<Purchase> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO books_purchased (reader_id, book_id, bookmark, purchase_date)
             VALUES (?1, ?2, 0, ?3)",
            params![reader_id, book_id, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Book already purchased".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(Purchase {
            bp_id: conn.last_insert_rowid(),
            reader_id,
            book_id,
            bookmark: 0,
            purchase_date: now,
        })
    }

    /// List a reader's purchases with their books.
    pub fn list_purchases(&self, reader_id: i64) -> Result<Vec<PurchasedBook>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT p.bp_id, p.reader_id, p.book_id, p.bookmark, p.purchase_date, {}
             FROM books_purchased p JOIN books b ON b.book_id = p.book_id
             WHERE p.reader_id = ?1 ORDER BY p.bp_id",
            BOOK_COLUMNS
        ))?;

        let purchases = stmt
            .query_map(params![reader_id], |row| {
                Ok(PurchasedBook {
                    purchase: Purchase {
                        bp_id: row.get(0)?,
                        reader_id: row.get(1)?,
                        book_id: row.get(2)?,
                        bookmark: row.get(3)?,
                        purchase_date: row.get(4)?,
                    },
                    book: book_from_row(row, 5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(purchases)
    }

    /// Check whether the reader owns the book.
    pub fn has_purchased(&self, reader_id: i64, book_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let exists = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM books_purchased WHERE reader_id = ?1 AND book_id = ?2)",
            params![reader_id, book_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Move a purchase's bookmark. Returns None if the reader does not own the book.
    pub fn update_bookmark(&self, reader_id: i64, book_id: i64, bookmark: i64) -> Result<Option<Purchase>> {
        let conn = self.conn.lock();
        let purchase = conn
            .query_row(
                "UPDATE books_purchased SET bookmark = ?1
                 WHERE reader_id = ?2 AND book_id = ?3
                 RETURNING bp_id, reader_id, book_id, bookmark, purchase_date",
                params![bookmark, reader_id, book_id],
                |row| {
                    Ok(Purchase {
                        bp_id: row.get(0)?,
                        reader_id: row.get(1)?,
                        book_id: row.get(2)?,
                        bookmark: row.get(3)?,
                        purchase_date: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(purchase)
    }

    // ========== CART / WISHLIST OPERATIONS ==========

    /// Add a book to a reader's cart or wishlist, returning the entry ID.
    pub fn add_list_item(&self, list: ReaderList, reader_id: i64, book_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (reader_id, book_id, added_at) VALUES (?1, ?2, ?3)",
                list.table()
            ),
            params![reader_id, book_id, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List a reader's cart or wishlist entries.
    pub fn list_items(&self, list: ReaderList, reader_id: i64) -> Result<Vec<ListItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT l.{id}, l.book_id, b.title, b.author, l.added_at
             FROM {table} l JOIN books b ON b.book_id = l.book_id
             WHERE l.reader_id = ?1 ORDER BY l.{id}",
            id = list.id_column(),
            table = list.table()
        ))?;

        let items = stmt
            .query_map(params![reader_id], |row| {
                Ok(ListItem {
                    id: row.get(0)?,
                    book_id: row.get(1)?,
                    title: row.get(2)?,
                    author: row.get(3)?,
                    added_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Delete a reader's cart or wishlist entry.
    pub fn delete_list_item(&self, list: ReaderList, id: i64, reader_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND reader_id = ?2",
                list.table(),
                list.id_column()
            ),
            params![id, reader_id],
        )?;
        Ok(rows > 0)
    }
}
