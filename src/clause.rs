//! Clause buffers: append-only text regions a query renders from.

use std::fmt;

/// What the condition text currently ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Empty,
    Condition,
    /// A connective (`AND`, `OR`, `NOT`) starting at this byte offset.
    Connective(usize),
    Open,
}

/// Boolean condition text (WHERE body, HAVING body, join ON body).
///
/// `AND` is inserted between two conditions unless a connective or an
/// opening bracket is already pending.
#[derive(Debug, Clone)]
pub struct ConditionBuffer {
    text: String,
    tail: Tail,
    /// Open brackets: where the bracket (and its connective) starts, and the
    /// tail to restore if it closes empty.
    marks: Vec<(usize, Tail)>,
}

impl Default for ConditionBuffer {
    fn default() -> Self {
        Self {
            text: String::new(),
            tail: Tail::Empty,
            marks: Vec::new(),
        }
    }
}

impl ConditionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn auto_and(&mut self) {
        if self.tail == Tail::Condition {
            self.text.push_str(" AND ");
        }
    }

    fn connective(&mut self, word: &str) {
        match self.tail {
            Tail::Condition => {
                let start = self.text.len();
                self.text.push(' ');
                self.text.push_str(word);
                self.text.push(' ');
                self.tail = Tail::Connective(start);
            }
            // last connective wins
            Tail::Connective(start) if !self.text[start..].contains("NOT") => {
                self.text.truncate(start);
                self.text.push(' ');
                self.text.push_str(word);
                self.text.push(' ');
            }
            _ => {}
        }
    }

    /// Append one condition.
    pub fn push(&mut self, condition: &str) {
        self.auto_and();
        self.text.push_str(condition);
        self.tail = Tail::Condition;
    }

    pub fn and(&mut self) {
        self.connective("AND");
    }

    pub fn or(&mut self) {
        self.connective("OR");
    }

    /// Negate the next condition or bracket.
    pub fn not(&mut self) {
        // a pending connective and this NOT are trimmed as one run
        let start = match self.tail {
            Tail::Connective(at) => at,
            _ => self.text.len(),
        };
        self.auto_and();
        self.text.push_str("NOT ");
        self.tail = Tail::Connective(start);
    }

    pub fn open(&mut self) {
        let start = self.text.len();
        let before = self.tail;
        self.auto_and();
        self.text.push('(');
        self.marks.push((start, before));
        self.tail = Tail::Open;
    }

    /// Close the innermost bracket, dropping a dangling connective. A bracket
    /// that closes empty disappears with its connective.
    pub fn close(&mut self) {
        let Some((start, before)) = self.marks.pop() else {
            return;
        };
        if let Tail::Connective(at) = self.tail {
            self.text.truncate(at);
            self.tail = if self.text.ends_with('(') {
                Tail::Open
            } else {
                Tail::Condition
            };
        }
        if self.tail == Tail::Open {
            self.text.truncate(start);
            self.tail = before;
        } else {
            self.text.push(')');
            self.tail = Tail::Condition;
        }
    }

    /// Text as it renders: a trailing connective is left out, the buffer
    /// itself is untouched.
    pub fn rendered(&self) -> &str {
        match self.tail {
            Tail::Connective(at) => &self.text[..at],
            _ => &self.text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rendered().trim().is_empty()
    }

    /// True when the rendered text has an `OR` outside any bracket.
    pub fn has_top_level_or(&self) -> bool {
        let text = self.rendered();
        let mut depth = 0usize;
        for (i, ch) in text.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ' ' if depth == 0 && text[i..].starts_with(" OR ") => return true,
                _ => {}
            }
        }
        false
    }
}

impl fmt::Display for ConditionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered())
    }
}

/// Comma-joined list (SET assignments, GROUP BY, ORDER BY, projections).
#[derive(Debug, Clone, Default)]
pub struct ListBuffer {
    items: Vec<String>,
}

impl ListBuffer {
    pub fn push(&mut self, item: impl Into<String>) {
        self.items.push(item.into());
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Take over every item of `other`, keeping its order.
    pub fn append(&mut self, other: ListBuffer) {
        self.items.extend(other.items);
    }
}

impl fmt::Display for ListBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.items.join(", "))
    }
}

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Fetch,
    LeftFetch,
}

impl JoinKind {
    /// Keyword text; fetch joins degrade to plain joins in count queries.
    pub fn keyword(self, count: bool) -> &'static str {
        match (self, count) {
            (JoinKind::Inner, _) | (JoinKind::Fetch, true) => "JOIN",
            (JoinKind::Left, _) | (JoinKind::LeftFetch, true) => "LEFT JOIN",
            (JoinKind::Fetch, false) => "JOIN FETCH",
            (JoinKind::LeftFetch, false) => "LEFT JOIN FETCH",
        }
    }
}

/// One entry of the from/joins region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinKind,
    /// Relation path on the owning alias, e.g. `c.orders`.
    pub path: String,
    pub alias: String,
    pub on: Option<String>,
}

impl JoinClause {
    pub fn render(&self, count: bool) -> String {
        let mut sql = format!(" {} {} AS {}", self.kind.keyword(count), self.path, self.alias);
        if let Some(on) = &self.on {
            sql.push_str(" ON (");
            sql.push_str(on);
            sql.push(')');
        }
        sql
    }
}

/// Every persistent region of a query. The header (SELECT/UPDATE/DELETE and
/// the root FROM) is derived at render time.
#[derive(Debug, Clone, Default)]
pub struct ClauseBuffers {
    pub projection: ListBuffer,
    pub joins: Vec<JoinClause>,
    pub set: ListBuffer,
    pub filter: ConditionBuffer,
    pub group: ListBuffer,
    pub having: ConditionBuffer,
    pub order: ListBuffer,
    pub suffix: String,
}
