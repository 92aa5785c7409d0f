use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ids::{IdGenerator, SequentialIds};
use crate::lexer;
use crate::model::*;
use crate::serializer::{self, RenderMode, SerializerSettings};

type IdSet = IndexSet<String>;

/// One line group of the file layout; transactions are referenced by id.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum Entry {
    Commodity(CommodityDirective),
    TagDirective(TagDirective),
    Comment(String),
    Transaction(String),
    BlankLine,
}

///
/// Parsed ledger: transactions by id, their file layout, and lookup indices.
///
/// Indices are only updated through [`LedgerStore::save_transaction`]; stored
/// transactions are handed out as shared references so they cannot drift from
/// the indices.
pub struct LedgerStore {
    pub(crate) entries: Vec<Entry>,
    pub(crate) transactions: IndexMap<String, Transaction>,
    dates: BTreeMap<NaiveDate, IdSet>,
    payees: IndexMap<String, IdSet>,
    accounts: IndexMap<String, IdSet>,
    tags: IndexMap<String, IdSet>,
    tag_values: IndexMap<(String, String), IdSet>,
    ids: Box<dyn IdGenerator>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::with_id_generator(Box::new(SequentialIds::default()))
    }
}

impl fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LedgerStore")
            .field("entries", &self.entries.len())
            .field("transactions", &self.transactions.len())
            .finish_non_exhaustive()
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_generator(ids: Box<dyn IdGenerator>) -> Self {
        LedgerStore {
            entries: Vec::new(),
            transactions: IndexMap::new(),
            dates: BTreeMap::new(),
            payees: IndexMap::new(),
            accounts: IndexMap::new(),
            tags: IndexMap::new(),
            tag_values: IndexMap::new(),
            ids,
        }
    }

    /// Parses the ledger file at `path`.
    ///
    /// A missing file is not an error: it is logged and an empty store is
    /// returned, so a caller can go on and write a fresh file.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse_with(path, Box::new(SequentialIds::default()))
    }

    pub fn parse_with<P: AsRef<Path>>(path: P, ids: Box<dyn IdGenerator>) -> Result<Self> {
        let path = path.as_ref();
        let mut store = Self::with_id_generator(ids);
        match lexer::tokenize(path, store.ids.as_mut()) {
            Ok(tokens) => store.load(tokens)?,
            Err(Error::FileNotFound { path }) => {
                warn!("ledger file '{}' does not exist, starting empty", path.display());
            }
            Err(err) => return Err(err),
        }
        info!(
            "parsed {} transaction(s) from '{}'",
            store.transactions.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn parse_str(input: &str) -> Result<Self> {
        let mut store = Self::new();
        let tokens = lexer::tokenize_str(input, store.ids.as_mut())?;
        store.load(tokens)?;
        Ok(store)
    }

    fn load(&mut self, tokens: Vec<Token>) -> Result<()> {
        for token in tokens {
            let entry = match token {
                Token::Commodity(directive) => Entry::Commodity(directive),
                Token::TagDirective(directive) => Entry::TagDirective(directive),
                Token::Comment(comment) => Entry::Comment(comment),
                Token::Transaction(transaction) => Entry::Transaction(self.insert(transaction)?),
                Token::BlankLine => Entry::BlankLine,
            };
            self.entries.push(entry);
        }
        Ok(())
    }

    /// Fresh identifier for a transaction built outside the store.
    pub fn next_id(&mut self) -> String {
        self.ids.next_id()
    }

    fn insert(&mut self, transaction: Transaction) -> Result<String> {
        let id = transaction.id().to_string();
        if self.transactions.contains_key(&id) {
            return Err(Error::DuplicateIdentifier { id });
        }
        transaction.validate(0)?;

        self.dates
            .entry(transaction.date)
            .or_default()
            .insert(id.clone());
        self.payees
            .entry(transaction.payee.clone())
            .or_default()
            .insert(id.clone());
        for post in &transaction.posts {
            self.accounts
                .entry(post.account.clone())
                .or_default()
                .insert(id.clone());
        }
        let all_tags = transaction
            .tags
            .iter()
            .chain(transaction.posts.iter().flat_map(|post| post.tags.iter()));
        for tag in all_tags {
            self.tags
                .entry(tag.name.clone())
                .or_default()
                .insert(id.clone());
            if let Some(ref value) = tag.value {
                self.tag_values
                    .entry((tag.name.clone(), value.clone()))
                    .or_default()
                    .insert(id.clone());
            }
        }

        self.transactions.insert(id.clone(), transaction);
        Ok(id)
    }

    /// Registers a transaction, indexes it and appends it to the layout.
    ///
    /// There is no deduplication: two equivalent transactions with different
    /// ids are both stored. Reusing an id is an error.
    pub fn save_transaction(&mut self, transaction: Transaction) -> Result<&Transaction> {
        let id = self.insert(transaction)?;
        if !matches!(self.entries.last(), None | Some(Entry::BlankLine)) {
            self.entries.push(Entry::BlankLine);
        }
        self.entries.push(Entry::Transaction(id.clone()));
        debug!("saved transaction {}", id);
        Ok(&self.transactions[&id])
    }

    fn lookup(&self, ids: Option<&IdSet>) -> Vec<&Transaction> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.transactions.get(id))
            .collect()
    }

    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_transactions_by_date(&self, date: NaiveDate) -> Vec<&Transaction> {
        self.lookup(self.dates.get(&date))
    }

    pub fn get_transactions_by_payee(&self, payee: &str) -> Vec<&Transaction> {
        self.lookup(self.payees.get(payee))
    }

    pub fn get_transactions_by_account(&self, account: &str) -> Vec<&Transaction> {
        self.lookup(self.accounts.get(account))
    }

    pub fn get_transactions_by_tag(&self, name: &str) -> Vec<&Transaction> {
        self.lookup(self.tags.get(name))
    }

    pub fn get_transactions_by_tag_value(&self, name: &str, value: &str) -> Vec<&Transaction> {
        self.lookup(self.tag_values.get(&(name.to_string(), value.to_string())))
    }

    /// Candidate duplicates of `transaction`: same date, at least one shared
    /// amount, and an overlapping top-level account type.
    ///
    /// Advisory only. Each candidate appears once; `transaction` itself is
    /// never returned.
    pub fn find_similar_transactions(&self, transaction: &Transaction) -> Vec<&Transaction> {
        let candidates = self.get_transactions_by_date(transaction.date);
        if candidates.is_empty() {
            return Vec::new();
        }

        let amounts: Vec<&Amount> = transaction
            .posts
            .iter()
            .filter_map(|post| post.amount.as_ref())
            .collect();
        let account_types = transaction.account_types();

        candidates
            .into_iter()
            .filter(|candidate| candidate.id() != transaction.id())
            .filter(|candidate| {
                candidate
                    .posts
                    .iter()
                    .filter_map(|post| post.amount.as_ref())
                    .any(|amount| amounts.contains(&amount))
            })
            .filter(|candidate| {
                candidate
                    .account_types()
                    .iter()
                    .any(|account_type| account_types.contains(account_type))
            })
            .collect()
    }

    /// Transactions in the order they were saved.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Known account names, in first-seen order.
    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Known payees, in first-seen order.
    pub fn payees(&self) -> impl Iterator<Item = &str> {
        self.payees.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn write<W: fmt::Write>(
        &self,
        writer: &mut W,
        mode: RenderMode,
        settings: &SerializerSettings,
    ) -> fmt::Result {
        match mode {
            RenderMode::AsParsed => serializer::write_as_parsed(self, writer, settings),
            RenderMode::Sorted => serializer::write_sorted(self, writer, settings),
        }
    }

    pub fn render(&self, mode: RenderMode) -> String {
        self.render_with(mode, &SerializerSettings::default())
    }

    pub fn render_with(&self, mode: RenderMode, settings: &SerializerSettings) -> String {
        let mut res = String::new();
        // Writing into a String never fails.
        let _ = self.write(&mut res, mode, settings);
        res
    }

    pub fn write_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        mode: RenderMode,
        settings: &SerializerSettings,
    ) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render_with(mode, settings)).map_err(|err| Error::io(path, err))?;
        info!("wrote {} transaction(s) to '{}'", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const SAMPLE: &str = r#"; sample ledger
commodity $
    format $1,000.00

tag trip

2019/08/02 * Opening Balances
    Assets:Checking   $ 100.00
    Equity:Opening Balances   $ -100.00

2019/05/01 * Bar
    ; :trip:
    Expenses:Food:Alcohol & Bars        $  388.19
    ; lm_id: 42
    Liabilities:Chase Sapphire Visa     $ -388.19

2019/08/02 ! Coffee
    Expenses:Food        $ 4.50
    Assets:Cash
"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd(cents: i64) -> Option<Amount> {
        Some(Amount::new(Decimal::new(cents, 2)))
    }

    fn build(store: &mut LedgerStore, day: NaiveDate, posts: Vec<Post>) -> Transaction {
        Transaction::new(store.next_id(), day, "Someone", posts).unwrap()
    }

    #[test]
    fn parse_indexes_everything() {
        let store = LedgerStore::parse_str(SAMPLE).unwrap();
        assert_eq!(store.len(), 3);

        let aug = store.get_transactions_by_date(date(2019, 8, 2));
        let payees: Vec<&str> = aug.iter().map(|t| t.payee.as_str()).collect();
        assert_eq!(payees, vec!["Opening Balances", "Coffee"]);
        assert!(store.get_transactions_by_date(date(2020, 1, 1)).is_empty());

        assert_eq!(store.get_transactions_by_payee("Bar").len(), 1);
        assert_eq!(store.get_transactions_by_account("Assets:Checking").len(), 1);
        assert_eq!(store.get_transactions_by_account("Expenses:Food").len(), 1);
        assert_eq!(store.get_transactions_by_tag("trip")[0].payee, "Bar");
        assert_eq!(store.get_transactions_by_tag("lm_id")[0].payee, "Bar");
        assert_eq!(store.get_transactions_by_tag_value("lm_id", "42")[0].payee, "Bar");
        assert!(store.get_transactions_by_tag_value("lm_id", "43").is_empty());

        assert_eq!(
            store.payees().collect::<Vec<_>>(),
            vec!["Opening Balances", "Bar", "Coffee"]
        );
        assert!(store.accounts().any(|a| a == "Liabilities:Chase Sapphire Visa"));
        assert_eq!(store.get_transaction("ledger-2").unwrap().payee, "Bar");
    }

    #[test]
    fn save_transaction_registers_and_appends() {
        let mut store = LedgerStore::parse_str(SAMPLE).unwrap();
        let t = build(
            &mut store,
            date(2019, 9, 1),
            vec![Post::new("Expenses:Rent", usd(90000)), Post::new("Assets:Checking", None)],
        );
        let id = store.save_transaction(t).unwrap().id().to_string();
        assert_eq!(id, "ledger-4");
        assert_eq!(store.len(), 4);
        assert_eq!(store.get_transactions_by_account("Assets:Checking").len(), 2);
        assert_eq!(
            store.entries[store.entries.len() - 2..],
            [Entry::BlankLine, Entry::Transaction(id)]
        );
    }

    #[test]
    fn save_transaction_rejects_duplicates_and_short_transactions() {
        let mut store = LedgerStore::new();
        let posts = vec![Post::new("Expenses:Food", usd(100)), Post::new("Assets:Cash", None)];
        let t = Transaction::new("fixed", date(2019, 1, 1), "A", posts.clone()).unwrap();
        store.save_transaction(t.clone()).unwrap();
        assert!(matches!(
            store.save_transaction(t),
            Err(Error::DuplicateIdentifier { .. })
        ));

        let mut short = Transaction::new("short", date(2019, 1, 1), "A", posts).unwrap();
        short.posts.pop();
        assert!(matches!(
            store.save_transaction(short),
            Err(Error::TooFewPostings { found: 1, .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn identical_transactions_are_stored_twice() {
        let mut store = LedgerStore::new();
        let posts = vec![Post::new("Expenses:Food", usd(100)), Post::new("Assets:Cash", None)];
        let a = build(&mut store, date(2019, 1, 1), posts.clone());
        let b = build(&mut store, date(2019, 1, 1), posts);
        assert!(a.is_equivalent(&b));
        store.save_transaction(a).unwrap();
        store.save_transaction(b).unwrap();
        assert_eq!(store.get_transactions_by_date(date(2019, 1, 1)).len(), 2);
    }

    #[test]
    fn find_similar_transactions_narrows_by_amount_and_account_type() {
        let mut store = LedgerStore::new();
        let day = date(2019, 8, 2);

        let food = build(
            &mut store,
            day,
            vec![
                Post::new("Expenses:Food", usd(1000)),
                Post::new("Liabilities:Visa", usd(-1000)),
            ],
        );
        let travel = build(
            &mut store,
            day,
            vec![
                Post::new("Expenses:Travel", usd(1000)),
                Post::new("Liabilities:Amex", usd(-1000)),
            ],
        );
        let transfer = build(
            &mut store,
            day,
            vec![
                Post::new("Assets:Checking", usd(1000)),
                Post::new("Income:Salary", usd(-1000)),
            ],
        );
        let other_amount = build(
            &mut store,
            day,
            vec![
                Post::new("Expenses:Food", usd(2500)),
                Post::new("Liabilities:Visa", usd(-2500)),
            ],
        );
        let other_day = build(
            &mut store,
            date(2019, 8, 3),
            vec![
                Post::new("Expenses:Food", usd(1000)),
                Post::new("Liabilities:Visa", usd(-1000)),
            ],
        );
        for t in [travel.clone(), transfer, other_amount, other_day] {
            store.save_transaction(t).unwrap();
        }

        let similar = store.find_similar_transactions(&food);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].id(), travel.id());

        store.save_transaction(food.clone()).unwrap();
        let similar = store.find_similar_transactions(&food);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].id(), travel.id());

        let lonely = build(
            &mut store,
            date(2001, 1, 1),
            vec![Post::new("Expenses:Food", usd(1000)), Post::new("Assets:Cash", None)],
        );
        assert!(store.find_similar_transactions(&lonely).is_empty());
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::parse(dir.path().join("new.ledger")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.render(RenderMode::AsParsed), "");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ledger");
        fs::write(&path, "2019/08/02 A\n    Assets:Cash  $ 1.00\n").unwrap();
        let err = LedgerStore::parse(&path).unwrap_err();
        assert!(matches!(err, Error::TooFewPostings { .. }));
    }

    #[test]
    fn write_and_reparse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ledger");
        let store = LedgerStore::parse_str(SAMPLE).unwrap();
        store
            .write_to_file(&path, RenderMode::Sorted, &SerializerSettings::default())
            .unwrap();

        let reparsed = LedgerStore::parse(&path).unwrap();
        assert_eq!(reparsed.len(), store.len());
        for before in store.transactions() {
            assert!(
                reparsed.transactions().any(|t| t.is_equivalent(before)),
                "no match for {}",
                before
            );
        }
    }

    #[test]
    fn external_reference_is_the_id() {
        let store = LedgerStore::parse_str(
            "2020/01/01 Shop\n    ; lm_id: 42\n    A  $ 1.00\n    B\n",
        )
        .unwrap();
        assert_eq!(store.get_transaction("42").unwrap().payee, "Shop");
        assert!(store.get_transaction("ledger-1").is_none());
        assert_eq!(store.get_transactions_by_tag_value("lm_id", "42").len(), 1);

        // A post-level reference does not name the transaction.
        let store = LedgerStore::parse_str(SAMPLE).unwrap();
        assert!(store.get_transaction("42").is_none());

        let err = LedgerStore::parse_str(concat!(
            "2020/01/01 A\n    ; lm_id: 7\n    X  1\n    Y\n\n",
            "2020/01/02 B\n    ; lm_id: 7\n    X  1\n    Y\n",
        ))
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { ref id } if id == "7"));
    }

    #[test]
    fn custom_id_generator() {
        let store = LedgerStore::parse_str(SAMPLE).unwrap();
        assert!(store.get_transaction("ledger-1").is_some());

        let mut store = LedgerStore::with_id_generator(Box::new(SequentialIds::with_prefix("new")));
        assert_eq!(store.next_id(), "new-1");
    }
}
