use chrono::NaiveDate;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1, take_while_m_n};
use nom::character::complete::{char, digit0, digit1, one_of, space0, space1};
use nom::combinator::{all_consuming, eof, map, map_res, opt, recognize, rest};
use nom::multi::{many1, separated_list1};
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::*;

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_white_char(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_comment_char(c: char) -> bool {
    COMMENT_CHARS.contains(&c)
}

fn is_commodity_char(c: char) -> bool {
    c != '-' && !is_digit(c) && !is_white_char(c) && !is_comment_char(c)
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Byte range of the first hard separator (two or more spaces, or any run
/// of whitespace containing a tab) at or after `from`.
fn find_hard_separator(text: &str, from: usize) -> Option<(usize, usize)> {
    let mut run_start: Option<usize> = None;
    for (pos, c) in text[from..].char_indices().map(|(p, c)| (p + from, c)) {
        if is_white_char(c) {
            run_start.get_or_insert(pos);
            continue;
        }
        if let Some(start) = run_start.take() {
            let run = &text[start..pos];
            if run.len() >= 2 || run.contains('\t') {
                return Some((start, pos));
            }
        }
    }
    let start = run_start?;
    let run = &text[start..];
    if run.len() >= 2 || run.contains('\t') {
        Some((start, text.len()))
    } else {
        None
    }
}

fn number_n(input: &str, n: usize) -> IResult<&str, u32> {
    map_res(take_while_m_n(n, n, is_digit), u32::from_str)(input)
}

fn parse_date_internal(input: &str) -> IResult<&str, (i32, u32, u32)> {
    map(
        tuple((
            |i| number_n(i, 4),
            one_of("-/"),
            |i| number_n(i, 2),
            one_of("-/"),
            |i| number_n(i, 2),
        )),
        |(year, _, month, _, day)| (year as i32, month, day),
    )(input)
}

fn parse_quantity(input: &str) -> IResult<&str, Decimal> {
    map_res(
        tuple((
            take_while_m_n(1, 3, is_digit),
            alt((
                map(
                    many1(preceded(char(','), take_while_m_n(3, 3, is_digit))),
                    |groups: Vec<&str>| groups.concat(),
                ),
                map(digit0, |d: &str| d.to_string()),
            )),
            opt(recognize(preceded(char('.'), digit1))),
        )),
        |(leading, tail, fractional): (&str, String, Option<&str>)| {
            Decimal::from_str(&format!("{}{}{}", leading, tail, fractional.unwrap_or("")))
        },
    )(input)
}

fn parse_sign(input: &str) -> IResult<&str, Option<char>> {
    opt(terminated(one_of("+-"), space0))(input)
}

/// `[-] [$] [-] QUANTITY [CODE]`; `$` means the default commodity.
pub(crate) fn parse_amount(input: &str) -> IResult<&str, Amount> {
    let (input, outer_sign) = parse_sign(input)?;
    let (input, _) = opt(terminated(char('$'), space0))(input)?;
    let (input, inner_sign) = parse_sign(input)?;
    let (input, quantity) = parse_quantity(input)?;
    let (input, code) = opt(preceded(space0, take_while1(is_commodity_char)))(input)?;

    let negative = [outer_sign, inner_sign]
        .iter()
        .filter(|sign| **sign == Some('-'))
        .count()
        % 2
        == 1;
    let quantity = if negative { -quantity } else { quantity };
    Ok((
        input,
        Amount::with_commodity(quantity, code.unwrap_or(DEFAULT_COMMODITY)),
    ))
}

/// Status and the rest of the line. Without a status the leading whitespace
/// is kept, so a note right after the date still sits behind a hard separator.
fn parse_header(input: &str) -> IResult<&str, (Option<char>, &str)> {
    alt((
        tuple((preceded(space1, map(one_of("*!"), Some)), rest)),
        map(recognize(preceded(space1, rest)), |text: &str| (None, text)),
        map(eof, |end: &str| (None, end)),
    ))(input)
}

/// First line of a transaction block, split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FirstLine {
    pub date: NaiveDate,
    pub status: TransactionStatus,
    pub payee: String,
    pub note: Option<String>,
}

pub(crate) fn parse_first_line(line: &str, line_no: usize) -> Result<FirstLine> {
    let malformed = || Error::MalformedFirstLine {
        line: line_no,
        text: line.to_string(),
    };

    let (after_date, (year, month, day)) = parse_date_internal(line).map_err(|_| malformed())?;
    let (_, (status, payee_and_note)) = parse_header(after_date).map_err(|_| malformed())?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| Error::InvalidDate {
        line: line_no,
        text: line.to_string(),
    })?;

    let (payee, note) = split_payee_and_note(payee_and_note);
    Ok(FirstLine {
        date,
        status: TransactionStatus::from_char(status),
        payee: payee.to_string(),
        note: note.map(|n| n.to_string()),
    })
}

/// Splits at the first hard separator that is followed by a comment character.
fn split_payee_and_note(text: &str) -> (&str, Option<&str>) {
    let mut from = 0;
    while let Some((start, end)) = find_hard_separator(text, from) {
        let tail = text[end..].trim_start();
        if tail.starts_with(is_comment_char) {
            let note = tail[1..].trim();
            return (text[..start].trim(), Some(note).filter(|n| !n.is_empty()));
        }
        from = end;
    }
    (text.trim(), None)
}

/// Content of an indented comment line, without the comment character.
pub(crate) fn parse_comment_line(line: &str) -> Option<&str> {
    let result: IResult<&str, &str> = preceded(space1, preceded(one_of(";#%|"), rest))(line);
    result.ok().map(|(_, comment)| comment.trim())
}

/// A comment, classified into the metadata it carries.
#[derive(Debug, PartialEq, Eq)]
pub enum Comment {
    ValueTag(Tag),
    ListTags(Vec<Tag>),
    PlainNote(String),
}

fn parse_value_tag(input: &str) -> IResult<&str, &str> {
    terminated(take_while1(is_tag_char), tuple((char(':'), alt((space1, eof)))))(input)
}

fn parse_tag_group(input: &str) -> IResult<&str, Vec<&str>> {
    preceded(char(':'), many1(terminated(take_while1(is_tag_char), char(':'))))(input)
}

fn parse_tag_list(input: &str) -> IResult<&str, Vec<Vec<&str>>> {
    all_consuming(separated_list1(
        take_while1(|c: char| is_white_char(c) || c == ','),
        parse_tag_group,
    ))(input)
}

/// Matchers run in fixed order: `name: value`, then `:a:b:` lists, then note.
pub fn classify_comment(comment: &str, line_no: usize) -> Result<Comment> {
    let comment = comment.trim();

    if parse_value_tag(comment).is_ok() {
        let parts: Vec<&str> = comment.split(':').collect();
        if parts.len() != 2 {
            return Err(Error::TagValueArityMismatch {
                line: line_no,
                comment: comment.to_string(),
            });
        }
        return Ok(Comment::ValueTag(Tag::with_value(parts[0].trim(), parts[1].trim())));
    }

    if let Ok((_, groups)) = parse_tag_list(comment) {
        let tags = groups.into_iter().flatten().map(Tag::new).collect();
        return Ok(Comment::ListTags(tags));
    }

    Ok(Comment::PlainNote(comment.to_string()))
}

/// A posting line, before it is attached to its transaction.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PostLine {
    pub account: String,
    pub amount: Option<Amount>,
    pub note: Option<String>,
}

fn looks_like_amount(word: &str) -> bool {
    word.contains('$')
        || ((word.starts_with('-') || word.starts_with('+'))
            && word[1..].starts_with(|c: char| c.is_ascii_digit()))
}

pub(crate) fn parse_post_line(line: &str, line_no: usize) -> Result<PostLine> {
    let body = line.trim();

    let account_end = [
        find_hard_separator(body, 0).map(|(start, _)| start),
        body.find(is_comment_char),
    ]
    .iter()
    .flatten()
    .copied()
    .min()
    .unwrap_or(body.len());
    let account = body[..account_end].trim_end();

    if account.is_empty() {
        return Err(Error::UnrecognizedLine {
            line: line_no,
            text: line.to_string(),
        });
    }
    if account.split_whitespace().any(looks_like_amount) {
        return Err(Error::MissingAccountAmountSeparator {
            line: line_no,
            text: line.to_string(),
        });
    }

    let remainder = &body[account_end..];
    let (amount_text, note) = match remainder.find(is_comment_char) {
        Some(pos) => (&remainder[..pos], Some(remainder[pos + 1..].trim())),
        None => (remainder, None),
    };
    let amount_text = amount_text.trim();

    let amount = if amount_text.contains(is_digit) {
        let (_, amount) =
            all_consuming(parse_amount)(amount_text).map_err(|_| Error::InvalidAmount {
                line: line_no,
                text: line.to_string(),
            })?;
        Some(amount)
    } else {
        None
    };

    Ok(PostLine {
        account: account.to_string(),
        amount,
        note: note.filter(|n| !n.is_empty()).map(|n| n.to_string()),
    })
}

pub(crate) fn parse_commodity_header(line: &str) -> Option<&str> {
    let result: IResult<&str, &str> =
        preceded(alt((tag("commodity"), tag("c"))), preceded(space1, rest))(line);
    result
        .ok()
        .map(|(_, name)| name.trim())
        .filter(|name| !name.is_empty())
}

/// `key value` option line inside a commodity block; the value may be empty.
pub(crate) fn parse_commodity_option(line: &str) -> (String, String) {
    let line = line.trim();
    match line.split_once(is_white_char) {
        Some((key, value)) => (key.to_string(), value.trim().to_string()),
        None => (line.to_string(), String::new()),
    }
}

pub(crate) fn parse_tag_directive(line: &str) -> Option<&str> {
    let result: IResult<&str, &str> = preceded(tag("tag"), preceded(space1, rest))(line);
    result
        .ok()
        .map(|(_, name)| name.trim())
        .filter(|name| !name.is_empty())
}
