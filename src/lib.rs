//! Rust library for reading, indexing and re-emitting plain-text double-entry
//! ledger files.
//!
//! Only a subset of the ledger-cli's file format is implemented.
//!
//! Supported elements:
//!
//! * Line comments at file level (starting with: ``; # % |``)
//!
//! * Commodity directives (``commodity NAME`` or ``c NAME``) followed by
//!   indented ``key value`` options, and tag directives (``tag NAME``).
//!   Both are kept and written back, but not interpreted.
//!
//! * Transaction headers with format:
//!
//!   ```ignore
//!   DATE [*|!] PAYEE [  ; NOTE]
//!   ```
//!
//!   where ``DATE`` is ``YYYY-MM-DD`` or ``YYYY/MM/DD``.
//!
//! * Transaction postings with format (minimum two spaces or one tab between
//!   ``ACCOUNT`` and ``AMOUNT``):
//!
//!   ```ignore
//!     ACCOUNT  [$] AMOUNT [CODE] [; NOTE]
//!   ```
//!
//!   The ``AMOUNT`` may be left out; postings are not checked to balance.
//!
//! * Indented comments inside a transaction. Before the first posting they
//!   belong to the transaction, after a posting to that posting. A comment is
//!   read as ``name: value`` tag, as ``:tag1:tag2:`` tag list, or else as a note.
//!   A ``lm_id: VALUE`` tag on the transaction itself becomes its id.
//!
//! Beware that any comment starting with ``word:`` and a space is taken as a
//! value tag, and a value holding another ``:`` is an error that fails the
//! whole file. ``; see: http://example.com`` is such a comment; write it as
//! ``; see http://example.com`` to keep it a note.

extern crate chrono;
extern crate nom;
extern crate rust_decimal;

mod error;
mod ids;
mod lexer;
mod model;
mod parser;
mod serializer;
mod store;

pub use error::{Error, Result};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use lexer::{tokenize, tokenize_str, Lexer};
pub use model::*;
pub use parser::{classify_comment, Comment};
pub use serializer::{RenderMode, Serializer, SerializerSettings};
pub use store::LedgerStore;

use std::path::Path;

/// Parses the ledger file at `path` into an indexed store.
///
/// A missing file gives an empty store; any malformed line fails the whole
/// parse.
///
/// # Examples
///
/// ```rust,ignore
/// let store = ledger_store::parse("personal.ledger")?;
/// for t in store.get_transactions_by_date(NaiveDate::from_ymd_opt(2019, 8, 2).unwrap()) {
///     println!("{}", t);
/// }
/// ```
pub fn parse<P: AsRef<Path>>(path: P) -> Result<LedgerStore> {
    LedgerStore::parse(path)
}
