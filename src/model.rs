use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// Commodity code assumed when an amount carries none (and what `$` stands for).
pub const DEFAULT_COMMODITY: &str = "USD";

/// Value tag naming an external reference; a parsed transaction carrying it
/// at transaction level takes the value as its id.
pub const EXTERNAL_ID_TAG: &str = "lm_id";

/// Characters that open a comment in a ledger file.
pub const COMMENT_CHARS: [char; 4] = [';', '#', '%', '|'];

///
/// One lexical unit of a ledger file, in file order.
///
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    Commodity(CommodityDirective),
    TagDirective(TagDirective),
    /// Non-indented comment line at file level, kept verbatim.
    Comment(String),
    Transaction(Transaction),
    BlankLine,
}

///
/// `commodity NAME` followed by indented `key value` options.
///
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommodityDirective {
    pub name: String,
    pub options: Vec<(String, String)>,
    /// Lines exactly as read; replayed on output when present.
    pub raw: Vec<String>,
}

impl CommodityDirective {
    pub fn new(name: &str) -> Self {
        CommodityDirective {
            name: name.to_string(),
            options: Vec::new(),
            raw: Vec::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.push((key.to_string(), value.to_string()));
        self
    }
}

///
/// `tag NAME` declaration. Has no effect on transactions.
///
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TagDirective {
    pub name: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum TransactionStatus {
    Cleared,
    Pending,
    #[default]
    Unknown,
}

impl TransactionStatus {
    pub fn from_char(c: Option<char>) -> Self {
        match c {
            Some('*') => TransactionStatus::Cleared,
            Some('!') => TransactionStatus::Pending,
            _ => TransactionStatus::Unknown,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransactionStatus::Cleared => write!(f, "*"),
            TransactionStatus::Pending => write!(f, "!"),
            TransactionStatus::Unknown => Ok(()),
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Amount {
    pub quantity: Decimal,
    pub commodity: String,
}

impl Amount {
    pub fn new(quantity: Decimal) -> Self {
        Amount {
            quantity,
            commodity: DEFAULT_COMMODITY.to_string(),
        }
    }

    /// `$` and an empty code both mean the default commodity.
    pub fn with_commodity(quantity: Decimal, commodity: &str) -> Self {
        let commodity = match commodity.trim() {
            "" | "$" => DEFAULT_COMMODITY,
            code => code,
        };
        Amount {
            quantity,
            commodity: commodity.to_string(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut quantity = self.quantity;
        if quantity.scale() < 2 {
            quantity.rescale(2);
        }
        if self.commodity == DEFAULT_COMMODITY {
            write!(f, "$ {}", quantity)
        } else {
            write!(f, "{} {}", quantity, self.commodity)
        }
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

///
/// Structured metadata attached to a transaction or a post.
///
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct Tag {
    pub name: String,
    pub value: Option<String>,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Tag {
            name: name.to_string(),
            value: None,
        }
    }

    /// An empty value is the same as no value.
    pub fn with_value(name: &str, value: &str) -> Self {
        Tag {
            name: name.to_string(),
            value: if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            },
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value {
            Some(ref value) => write!(f, "{}: {}", self.name, value),
            None => write!(f, ":{}:", self.name),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Note {
    pub text: String,
    /// Rendered after the owner's line instead of on a line of its own.
    pub inline: bool,
}

impl Note {
    pub fn new(text: &str) -> Self {
        Note {
            text: text.to_string(),
            inline: false,
        }
    }

    pub fn inline(text: &str) -> Self {
        Note {
            text: text.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Post {
    pub account: String,
    pub amount: Option<Amount>,
    pub notes: Vec<Note>,
    pub tags: Vec<Tag>,
}

impl Post {
    pub fn new(account: &str, amount: Option<Amount>) -> Self {
        Post {
            account: account.to_string(),
            amount,
            notes: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Top-level account type: the part before the first `:`, lower-cased.
    pub fn account_type(&self) -> String {
        self.account
            .split(':')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Render order: amounts descending, posts without an amount last.
    pub fn render_order(&self, other: &Post) -> Ordering {
        match (&self.amount, &other.amount) {
            (Some(a), Some(b)) => b.quantity.cmp(&a.quantity),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn equivalence_key(&self) -> (&str, Option<&Amount>, Vec<&str>, Vec<&Tag>) {
        let mut notes: Vec<&str> = self.notes.iter().map(|n| n.text.as_str()).collect();
        notes.sort_unstable();
        let mut tags: Vec<&Tag> = self.tags.iter().collect();
        tags.sort_unstable();
        (&self.account, self.amount.as_ref(), notes, tags)
    }
}

///
/// Transaction.
///
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Transaction {
    id: String,
    pub date: NaiveDate,
    pub payee: String,
    pub status: TransactionStatus,
    pub notes: Vec<Note>,
    pub tags: Vec<Tag>,
    pub posts: Vec<Post>,
    /// Source lines the transaction was parsed from. Never used for output.
    pub raw: Option<String>,
}

impl Transaction {
    /// Builds a transaction; fails with `TooFewPostings` for fewer than two posts.
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        payee: &str,
        posts: Vec<Post>,
    ) -> Result<Self> {
        let transaction = Transaction {
            id: id.into(),
            date,
            payee: payee.to_string(),
            status: TransactionStatus::Unknown,
            notes: Vec::new(),
            tags: Vec::new(),
            posts,
            raw: None,
        };
        transaction.validate(0)?;
        Ok(transaction)
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn validate(&self, line: usize) -> Result<()> {
        if self.posts.len() < 2 {
            return Err(Error::TooFewPostings {
                line,
                found: self.posts.len(),
                raw: self.raw.clone().unwrap_or_else(|| self.to_string()),
            });
        }
        Ok(())
    }

    /// Distinct lower-cased top-level account types of all posts.
    pub fn account_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.posts.iter().map(Post::account_type).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Semantic equality: everything but identity, raw text, ordering of
    /// posts/notes/tags, and whether a note is inline.
    pub fn is_equivalent(&self, other: &Transaction) -> bool {
        fn note_texts(notes: &[Note]) -> Vec<&str> {
            let mut texts: Vec<&str> = notes.iter().map(|n| n.text.as_str()).collect();
            texts.sort_unstable();
            texts
        }
        fn sorted_tags(tags: &[Tag]) -> Vec<&Tag> {
            let mut tags: Vec<&Tag> = tags.iter().collect();
            tags.sort_unstable();
            tags
        }
        fn post_keys(posts: &[Post]) -> Vec<(&str, Option<&Amount>, Vec<&str>, Vec<&Tag>)> {
            let mut keys: Vec<_> = posts.iter().map(Post::equivalence_key).collect();
            keys.sort();
            keys
        }

        self.date == other.date
            && self.payee == other.payee
            && self.status == other.status
            && note_texts(&self.notes) == note_texts(&other.notes)
            && sorted_tags(&self.tags) == sorted_tags(&other.tags)
            && post_keys(&self.posts) == post_keys(&other.posts)
    }
}
