//! Import of Doxygen `searchData` tables.
//!
//! Doxygen's HTML search emits one JavaScript file per category and first
//! character (`classes_17.js`, `typedefs_4.js`, ...), each assigning a nested
//! array literal:
//!
//! ```text
//! var searchData=
//! [
//!   ['peerfinder_10495',['PeerFinder',['../namespaceripple_1_1PeerFinder.html',1,'ripple']]],
//!   ['ptr',['ptr',['../classbeast_1_1insight_1_1Group.html#a71',1,'beast::insight::Group::ptr()'],
//!              ['../classripple_1_1Peer.html#a85',1,'ripple::Peer::ptr()']]]
//! ];
//! ```
//!
//! Every `[url, flag, scope]` target becomes one [`Entry`].

use crate::error::Result;
use crate::types::{Entry, EntryKind};
use anyhow::{Context, anyhow, bail};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*var\s+searchData\s*=\s*").expect("valid regex"));

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(lt|gt|amp|quot|apos|#39);").expect("valid regex"));

static CATEGORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+)_[0-9a-f]+\.js$").expect("valid regex"));

/// Search table categories the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Classes,
    Namespaces,
    Typedefs,
    Functions,
}

impl Category {
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "classes" => Self::Classes,
            "namespaces" => Self::Namespaces,
            "typedefs" => Self::Typedefs,
            "functions" => Self::Functions,
            other => bail!("Unsupported search data category '{}'", other),
        })
    }

    /// Kind of an entry in this category pointing at `url`.
    fn kind_for(self, url: &str) -> EntryKind {
        if url.starts_with("http://") || url.starts_with("https://") {
            return EntryKind::ExternalReference;
        }
        match self {
            Self::Namespaces => EntryKind::Namespace,
            Self::Typedefs => EntryKind::Typedef,
            Self::Functions => EntryKind::Function,
            Self::Classes => {
                let page = url.rsplit('/').next().unwrap_or(url);
                if page.starts_with("struct") {
                    EntryKind::Struct
                } else {
                    EntryKind::Class
                }
            }
        }
    }
}

/// Extracts the category from a Doxygen search file name (`classes_17.js` → `classes`).
pub fn category_from_file_name(file_name: &str) -> Option<&str> {
    CATEGORY
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parses one `searchData` table into entries, in file order.
pub fn parse_search_data(category: Category, text: &str) -> Result<Vec<Entry>> {
    let header_len = HEADER
        .find(text)
        .map(|m| m.end())
        .ok_or_else(|| anyhow!("Missing 'var searchData=' header"))?;

    let mut parser = Parser::new(text, header_len);
    let value = parser.value()?;
    parser.skip_ws();
    parser.eat(';');
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("trailing content after table"));
    }

    let records = value.into_list().context("searchData is not an array")?;
    let mut entries = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        entries.extend(
            record_entries(category, record).with_context(|| format!("Invalid record {}", index))?,
        );
    }

    Ok(entries)
}

/// Reads a Doxygen search file, inferring the category from its name.
pub async fn import_file(path: &Path) -> Result<Vec<Entry>> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid search data path {}", path.display()))?;
    let category = category_from_file_name(file_name)
        .ok_or_else(|| anyhow!("Not a Doxygen search data file: {}", file_name))
        .and_then(Category::parse)?;

    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let entries = parse_search_data(category, &text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!("Imported {} entries from {}", entries.len(), file_name);
    Ok(entries)
}

fn record_entries(category: Category, record: Value) -> Result<Vec<Entry>> {
    // ['<id>', ['<display>', [target], [target], ...]]
    let mut record = record.into_list()?.into_iter();
    let _id = record.next().ok_or_else(|| anyhow!("empty record"))?;
    let group = record
        .next()
        .ok_or_else(|| anyhow!("record has no entry group"))?
        .into_list()?;

    let mut group = group.into_iter();
    let display_name = decode_entities(
        &group
            .next()
            .ok_or_else(|| anyhow!("entry group has no display name"))?
            .into_str()?,
    );

    let mut entries = Vec::new();
    for target in group {
        let mut target = target.into_list()?.into_iter();
        let url = target
            .next()
            .ok_or_else(|| anyhow!("target without url"))?
            .into_str()?;
        // The second slot is Doxygen's "is a link" flag, unused here.
        let _flag = target.next();
        let scope = match target.next() {
            Some(scope) => decode_entities(&scope.into_str()?),
            None => String::new(),
        };

        let kind = category.kind_for(&url);
        entries.push(Entry::new(display_name.clone(), url, scope, kind)?);
    }

    if entries.is_empty() {
        bail!("'{}' has no targets", display_name);
    }
    Ok(entries)
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| match &caps[1] {
            "lt" => "<",
            "gt" => ">",
            "amp" => "&",
            "quot" => "\"",
            _ => "'",
        })
        .into_owned()
}

/// The subset of JavaScript literals Doxygen emits.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(i64),
    List(Vec<Value>),
}

impl Value {
    fn into_list(self) -> Result<Vec<Self>> {
        match self {
            Self::List(items) => Ok(items),
            other => bail!("expected array, found {:?}", other),
        }
    }

    fn into_str(self) -> Result<String> {
        match self {
            Self::Str(s) => Ok(s),
            other => bail!("expected string, found {:?}", other),
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, message: &str) -> anyhow::Error {
        let consumed = &self.text[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        anyhow!("line {}, column {}: {}", line, column, message)
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.list(),
            Some('\'' | '"') => self.string().map(Value::Str),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) => Err(self.error(&format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(']') {
                return Ok(Value::List(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(']') {
                return Ok(Value::List(items));
            }
            return Err(self.error("expected ',' or ']'"));
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.text[start..self.pos]
            .parse()
            .map(Value::Num)
            .map_err(|_| self.error("invalid number"))
    }
}
