use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter::{Enumerate, Peekable};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ids::IdGenerator;
use crate::model::*;
use crate::parser::*;

/// Splits a ledger source into tokens, one line of lookahead at a time.
///
/// Yields `Err` at the first malformed line and is not meant to be resumed
/// after that.
pub struct Lexer<'a, R: BufRead> {
    lines: Peekable<Enumerate<io::Lines<R>>>,
    path: PathBuf,
    ids: &'a mut dyn IdGenerator,
}

impl<'a, R: BufRead> Lexer<'a, R> {
    pub fn new(reader: R, path: impl Into<PathBuf>, ids: &'a mut dyn IdGenerator) -> Self {
        Lexer {
            lines: reader.lines().enumerate().peekable(),
            path: path.into(),
            ids,
        }
    }

    fn read(&self, (index, line): (usize, io::Result<String>)) -> Result<(usize, String)> {
        match line {
            Ok(line) => Ok((index + 1, line.trim_end_matches('\r').to_string())),
            Err(err) => Err(Error::io(&self.path, err)),
        }
    }

    fn next_line(&mut self) -> Option<Result<(usize, String)>> {
        let next = self.lines.next()?;
        Some(self.read(next))
    }

    /// Next line of the current block; a blank line or the end of input ends it.
    fn next_block_line(&mut self) -> Option<Result<(usize, String)>> {
        match self.lines.peek() {
            Some((_, Ok(line))) if line.trim().is_empty() => None,
            Some(_) => self.next_line(),
            None => None,
        }
    }

    fn lex_commodity(&mut self, name: &str, line: String) -> Result<CommodityDirective> {
        let mut directive = CommodityDirective::new(name);
        directive.raw.push(line);
        while let Some(next) = self.next_block_line() {
            let (_, line) = next?;
            directive.options.push(parse_commodity_option(&line));
            directive.raw.push(line);
        }
        Ok(directive)
    }

    fn lex_transaction(&mut self, line_no: usize, first: String) -> Result<Transaction> {
        let header = parse_first_line(&first, line_no)?;

        let mut notes: Vec<Note> = header.note.iter().map(|n| Note::inline(n)).collect();
        let mut tags: Vec<Tag> = Vec::new();
        let mut posts: Vec<Post> = Vec::new();
        let mut raw = vec![first];

        while let Some(next) = self.next_block_line() {
            let (no, line) = next?;
            if !line.starts_with([' ', '\t']) {
                return Err(Error::UnrecognizedLine { line: no, text: line });
            }

            if let Some(comment) = parse_comment_line(&line) {
                let (owner_notes, owner_tags) = match posts.last_mut() {
                    Some(post) => (&mut post.notes, &mut post.tags),
                    None => (&mut notes, &mut tags),
                };
                match classify_comment(comment, no)? {
                    Comment::ValueTag(tag) => owner_tags.push(tag),
                    Comment::ListTags(list) => owner_tags.extend(list),
                    Comment::PlainNote(text) if text.is_empty() => {}
                    Comment::PlainNote(text) => owner_notes.push(Note::new(&text)),
                }
            } else {
                let post_line = parse_post_line(&line, no)?;
                let mut post = Post::new(&post_line.account, post_line.amount);
                if let Some(note) = post_line.note {
                    post.notes.push(Note::inline(&note));
                }
                posts.push(post);
            }
            raw.push(line);
        }

        let raw = raw.join("\n");
        if posts.len() < 2 {
            return Err(Error::TooFewPostings {
                line: line_no,
                found: posts.len(),
                raw,
            });
        }

        let id = match tags
            .iter()
            .find(|tag| tag.name == EXTERNAL_ID_TAG)
            .and_then(|tag| tag.value.clone())
        {
            Some(reference) => reference,
            None => self.ids.next_id(),
        };
        let mut transaction =
            Transaction::new(id, header.date, &header.payee, posts)?.with_status(header.status);
        transaction.notes = notes;
        transaction.tags = tags;
        transaction.raw = Some(raw);
        Ok(transaction)
    }

    fn lex_line(&mut self, line_no: usize, line: String) -> Result<Token> {
        if line.trim().is_empty() {
            return Ok(Token::BlankLine);
        }
        if let Some(name) = parse_commodity_header(&line) {
            let name = name.to_string();
            return Ok(Token::Commodity(self.lex_commodity(&name, line)?));
        }
        if let Some(name) = parse_tag_directive(&line) {
            return Ok(Token::TagDirective(TagDirective {
                name: name.to_string(),
            }));
        }
        if line.starts_with(COMMENT_CHARS) {
            return Ok(Token::Comment(line));
        }
        if line.starts_with(|c: char| c.is_ascii_digit()) {
            let transaction = self.lex_transaction(line_no, line)?;
            debug!(
                "line {}: transaction {} '{}' with {} posts",
                line_no,
                transaction.id(),
                transaction.payee,
                transaction.posts.len()
            );
            return Ok(Token::Transaction(transaction));
        }
        Err(Error::UnrecognizedLine { line: line_no, text: line })
    }
}

impl<'a, R: BufRead> Iterator for Lexer<'a, R> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next_line()?;
        Some(next.and_then(|(line_no, line)| self.lex_line(line_no, line)))
    }
}

/// Reads and tokenizes the file at `path`.
pub fn tokenize<P: AsRef<Path>>(path: P, ids: &mut dyn IdGenerator) -> Result<Vec<Token>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    Lexer::new(BufReader::new(file), path, ids).collect()
}

pub fn tokenize_str(input: &str, ids: &mut dyn IdGenerator) -> Result<Vec<Token>> {
    Lexer::new(input.as_bytes(), "<string>", ids).collect()
}
