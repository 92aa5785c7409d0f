use std::io;
use std::path::PathBuf;

/// Errors produced while reading, building or writing a ledger.
///
/// Lexical and structural errors abort the whole parse: there is no partially
/// parsed store with bad entries dropped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("line {line}: invalid date in '{text}'")]
    InvalidDate { line: usize, text: String },

    #[error("line {line}: malformed transaction header '{text}'")]
    MalformedFirstLine { line: usize, text: String },

    #[error("line {line}: expected two spaces or a tab between account and amount in '{text}'")]
    MissingAccountAmountSeparator { line: usize, text: String },

    #[error("line {line}: invalid amount in '{text}'")]
    InvalidAmount { line: usize, text: String },

    #[error("line {line}: transaction has {found} posting(s), at least two are required:\n{raw}")]
    TooFewPostings { line: usize, found: usize, raw: String },

    #[error("line {line}: tag '{comment}' must have the form 'name: value'")]
    TagValueArityMismatch { line: usize, comment: String },

    #[error("line {line}: unrecognized line '{text}'")]
    UnrecognizedLine { line: usize, text: String },

    #[error("ledger file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transaction id '{id}' is already registered")]
    DuplicateIdentifier { id: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Error::FileNotFound { path }
        } else {
            Error::Io { path, source }
        }
    }

    /// Line number the error was raised on, when it came from the lexer.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::InvalidDate { line, .. }
            | Error::MalformedFirstLine { line, .. }
            | Error::MissingAccountAmountSeparator { line, .. }
            | Error::InvalidAmount { line, .. }
            | Error::TooFewPostings { line, .. }
            | Error::TagValueArityMismatch { line, .. }
            | Error::UnrecognizedLine { line, .. } => Some(*line),
            _ => None,
        }
    }
}
