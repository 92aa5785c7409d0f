use log::warn;
use std::fmt;

use crate::model::*;
use crate::store::{Entry, LedgerStore};

/// How a whole store is written back out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RenderMode {
    /// Original token order and blank lines, transactions regenerated.
    AsParsed,
    /// Commodities, tag directives, then transactions by date.
    Sorted,
}

#[non_exhaustive]
pub struct SerializerSettings {
    indent: String,
    comment_char: char,
}

impl SerializerSettings {
    pub fn with_indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    /// Only the characters the lexer reads as comments are accepted.
    pub fn with_comment_char(mut self, comment_char: char) -> Self {
        if COMMENT_CHARS.contains(&comment_char) {
            self.comment_char = comment_char;
        } else {
            warn!("'{}' is not a comment character, keeping '{}'", comment_char, self.comment_char);
        }
        self
    }
}

impl Default for SerializerSettings {
    fn default() -> Self {
        Self {
            indent: "    ".to_string(),
            comment_char: ';',
        }
    }
}

pub trait Serializer {
    fn write<W>(&self, writer: &mut W, settings: &SerializerSettings) -> fmt::Result
    where
        W: fmt::Write;

    fn to_string_pretty(&self, settings: &SerializerSettings) -> String {
        let mut res = String::new();
        // Writing into a String never fails.
        let _ = self.write(&mut res, settings);
        res
    }
}

/// A leading inline note goes on the owner's line, everything else below it.
fn split_inline_note(notes: &[Note]) -> (Option<&Note>, &[Note]) {
    match notes.split_first() {
        Some((first, rest)) if first.inline => (Some(first), rest),
        _ => (None, notes),
    }
}

fn write_comment_lines<W: fmt::Write>(
    writer: &mut W,
    notes: &[Note],
    tags: &[Tag],
    settings: &SerializerSettings,
) -> fmt::Result {
    for note in notes {
        write!(writer, "\n{}{} {}", settings.indent, settings.comment_char, note.text)?;
    }
    for tag in tags {
        write!(writer, "\n{}{} {}", settings.indent, settings.comment_char, tag)?;
    }
    Ok(())
}

impl Serializer for Transaction {
    fn write<W>(&self, writer: &mut W, settings: &SerializerSettings) -> fmt::Result
    where
        W: fmt::Write,
    {
        write!(writer, "{}", self.date.format("%Y-%m-%d"))?;

        if self.status != TransactionStatus::Unknown {
            write!(writer, " {}", self.status)?;
        }

        if !self.payee.is_empty() {
            write!(writer, " {}", self.payee)?;
        }

        let (inline_note, notes) = split_inline_note(&self.notes);
        if let Some(note) = inline_note {
            write!(writer, "  {} {}", settings.comment_char, note.text)?;
        }
        write_comment_lines(writer, notes, &self.tags, settings)?;

        let mut posts: Vec<&Post> = self.posts.iter().collect();
        posts.sort_by(|a, b| a.render_order(b));

        let amounts: Vec<Option<String>> = posts
            .iter()
            .map(|post| post.amount.as_ref().map(|amount| amount.to_string()))
            .collect();
        let account_width = posts
            .iter()
            .map(|post| post.account.chars().count())
            .max()
            .unwrap_or(0);
        let amount_width = amounts
            .iter()
            .flatten()
            .map(|amount| amount.chars().count())
            .max()
            .unwrap_or(0);

        for (post, amount) in posts.iter().zip(&amounts) {
            write!(writer, "\n{}", settings.indent)?;
            match amount {
                Some(amount) => write!(
                    writer,
                    "{:<aw$}  {:>mw$}",
                    post.account,
                    amount,
                    aw = account_width,
                    mw = amount_width
                )?,
                None => write!(writer, "{}", post.account)?,
            }

            let (inline_note, notes) = split_inline_note(&post.notes);
            if let Some(note) = inline_note {
                write!(writer, "  {} {}", settings.comment_char, note.text)?;
            }
            write_comment_lines(writer, notes, &post.tags, settings)?;
        }

        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Serializer::write(self, f, &SerializerSettings::default())
    }
}

impl Serializer for CommodityDirective {
    fn write<W>(&self, writer: &mut W, settings: &SerializerSettings) -> fmt::Result
    where
        W: fmt::Write,
    {
        if !self.raw.is_empty() {
            return write!(writer, "{}", self.raw.join("\n"));
        }

        write!(writer, "commodity {}", self.name)?;
        for (key, value) in &self.options {
            write!(writer, "\n{}{}", settings.indent, key)?;
            if !value.is_empty() {
                write!(writer, " {}", value)?;
            }
        }
        Ok(())
    }
}

impl Serializer for TagDirective {
    fn write<W>(&self, writer: &mut W, _settings: &SerializerSettings) -> fmt::Result
    where
        W: fmt::Write,
    {
        write!(writer, "tag {}", self.name)
    }
}

impl Serializer for Token {
    fn write<W>(&self, writer: &mut W, settings: &SerializerSettings) -> fmt::Result
    where
        W: fmt::Write,
    {
        match self {
            Token::Commodity(directive) => directive.write(writer, settings),
            Token::TagDirective(directive) => directive.write(writer, settings),
            Token::Comment(comment) => write!(writer, "{}", comment),
            Token::Transaction(transaction) => transaction.write(writer, settings),
            Token::BlankLine => Ok(()),
        }
    }
}

pub(crate) fn write_as_parsed<W: fmt::Write>(
    store: &LedgerStore,
    writer: &mut W,
    settings: &SerializerSettings,
) -> fmt::Result {
    for entry in &store.entries {
        match entry {
            Entry::Commodity(directive) => directive.write(writer, settings)?,
            Entry::TagDirective(directive) => directive.write(writer, settings)?,
            Entry::Comment(comment) => write!(writer, "{}", comment)?,
            Entry::Transaction(id) => {
                if let Some(transaction) = store.transactions.get(id) {
                    transaction.write(writer, settings)?;
                }
            }
            Entry::BlankLine => {}
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub(crate) fn write_sorted<W: fmt::Write>(
    store: &LedgerStore,
    writer: &mut W,
    settings: &SerializerSettings,
) -> fmt::Result {
    let mut sections: Vec<String> = Vec::new();

    let comments: Vec<&str> = store
        .entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Comment(comment) => Some(comment.as_str()),
            _ => None,
        })
        .collect();
    if !comments.is_empty() {
        sections.push(comments.join("\n"));
    }

    for entry in &store.entries {
        if let Entry::Commodity(directive) = entry {
            sections.push(directive.to_string_pretty(settings));
        }
    }

    let tag_directives: Vec<String> = store
        .entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::TagDirective(directive) => Some(directive.to_string_pretty(settings)),
            _ => None,
        })
        .collect();
    if !tag_directives.is_empty() {
        sections.push(tag_directives.join("\n"));
    }

    let mut transactions: Vec<&Transaction> = store.transactions.values().collect();
    transactions.sort_by_key(|transaction| transaction.date);
    for transaction in transactions {
        sections.push(transaction.to_string_pretty(settings));
    }

    if !sections.is_empty() {
        writeln!(writer, "{}", sections.join("\n\n"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn usd(cents: i64) -> Option<Amount> {
        Some(Amount::new(Decimal::new(cents, 2)))
    }

    fn eur(units: i64) -> Amount {
        Amount::with_commodity(Decimal::new(units, 0), "EUR")
    }

    fn sample() -> Transaction {
        Transaction::new(
            "t1",
            NaiveDate::from_ymd_opt(2019, 8, 2).unwrap(),
            "Opening Balances",
            vec![
                Post::new("Equity:Opening Balances", None),
                Post::new("Liabilities:Visa", usd(-38819)),
                Post::new("Assets:Checking", usd(10000)),
            ],
        )
        .unwrap()
        .with_status(TransactionStatus::Cleared)
    }

    #[test]
    fn display_transaction() {
        let expected = "2019-08-02 * Opening Balances
    Assets:Checking           $ 100.00
    Liabilities:Visa         $ -388.19
    Equity:Opening Balances";
        assert_eq!(format!("{}", sample()), expected);
    }

    #[test]
    fn display_transaction_with_notes_and_tags() {
        let mut t = sample()
            .with_status(TransactionStatus::Unknown)
            .with_note(Note::inline("first"))
            .with_note(Note::new("second"))
            .with_tag(Tag::new("trip"))
            .with_tag(Tag::with_value("lm_id", "42"));
        t.posts[0].notes.push(Note::inline("balancing"));
        t.posts[1].tags.push(Tag::new("card"));
        t.posts[1].notes.push(Note::new("statement 7"));

        let expected = "2019-08-02 Opening Balances  ; first
    ; second
    ; :trip:
    ; lm_id: 42
    Assets:Checking           $ 100.00
    Liabilities:Visa         $ -388.19
    ; statement 7
    ; :card:
    Equity:Opening Balances  ; balancing";
        assert_eq!(format!("{}", t), expected);
    }

    #[test]
    fn settings_change_indent_and_comment_char() {
        let t = sample().with_note(Note::new("hello"));
        let settings = SerializerSettings::default()
            .with_indent("\t")
            .with_comment_char('#');
        assert_eq!(
            t.to_string_pretty(&settings),
            "2019-08-02 * Opening Balances
\t# hello
\tAssets:Checking           $ 100.00
\tLiabilities:Visa         $ -388.19
\tEquity:Opening Balances"
        );

        let settings = SerializerSettings::default().with_comment_char('x');
        assert_eq!(settings.comment_char, ';');
    }

    #[test]
    fn non_default_commodities_render_after_quantity() {
        let t = Transaction::new(
            "t2",
            NaiveDate::from_ymd_opt(2020, 1, 5).unwrap(),
            "Bakery",
            vec![
                Post::new("Expenses:Food", Some(eur(5))),
                Post::new("Assets:Wallet", Some(eur(-5))),
            ],
        )
        .unwrap();
        assert_eq!(
            format!("{}", t),
            "2020-01-05 Bakery
    Expenses:Food   5.00 EUR
    Assets:Wallet  -5.00 EUR"
        );
    }

    #[test]
    fn display_tokens() {
        let commodity = CommodityDirective::new("$")
            .with_option("format", "$1,000.00")
            .with_option("nomarket", "");
        assert_eq!(
            Token::Commodity(commodity).to_string_pretty(&SerializerSettings::default()),
            "commodity $\n    format $1,000.00\n    nomarket"
        );

        let verbatim = CommodityDirective {
            name: "EUR".to_string(),
            options: vec![("note".to_string(), "euro".to_string())],
            raw: vec!["c EUR".to_string(), "\tnote euro".to_string()],
        };
        assert_eq!(
            verbatim.to_string_pretty(&SerializerSettings::default()),
            "c EUR\n\tnote euro"
        );
        assert_eq!(
            Token::TagDirective(TagDirective {
                name: "trip".to_string()
            })
            .to_string_pretty(&SerializerSettings::default()),
            "tag trip"
        );
        assert_eq!(
            Token::BlankLine.to_string_pretty(&SerializerSettings::default()),
            ""
        );
    }
}
