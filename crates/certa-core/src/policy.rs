//! Access structures: boolean policies over attributes.
//!
//! ## Syntax
//!
//! ```text
//! policy    := or_expr
//! or_expr   := and_expr ("or" and_expr)*
//! and_expr  := atom ("and" atom)*
//! atom      := "(" or_expr ")"
//!            | K "of" "(" or_expr ("," or_expr)* ")"
//!            | attribute
//! ```
//!
//! Keywords are case-insensitive. `and` binds tighter than `or`. Every node is
//! a threshold gate: `a and b` is 2-of-2, `a or b` is 1-of-2.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::Attribute;

/// A parsed policy tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessStructure {
    /// Satisfied by holding the attribute.
    Leaf(Attribute),
    /// Satisfied when at least `threshold` children are satisfied.
    Gate {
        threshold: usize,
        children: Vec<AccessStructure>,
    },
}

impl AccessStructure {
    /// Parse a policy string.
    pub fn parse(input: &str) -> Result<Self, PolicyError> {
        let tokens = tokenize(input);
        if tokens.is_empty() {
            return Err(PolicyError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let tree = parser.parse_or()?;

        if let Some((position, token)) = parser.tokens.get(parser.pos) {
            return Err(PolicyError::UnexpectedToken {
                found: token.describe(),
                position: *position,
            });
        }
        Ok(tree)
    }

    /// Leaf attributes in depth-first order, duplicates included.
    pub fn attributes(&self) -> Vec<&Attribute> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    /// Distinct attributes referenced by the policy.
    pub fn distinct_attributes(&self) -> BTreeSet<&Attribute> {
        self.attributes().into_iter().collect()
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Attribute>) {
        match self {
            Self::Leaf(attr) => out.push(attr),
            Self::Gate { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Evaluate the policy against a predicate telling which attributes are held.
    pub fn is_satisfied_by<F>(&self, has: &F) -> bool
    where
        F: Fn(&Attribute) -> bool,
    {
        match self {
            Self::Leaf(attr) => has(attr),
            Self::Gate {
                threshold,
                children,
            } => children.iter().filter(|c| c.is_satisfied_by(has)).count() >= *threshold,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(attr) => write!(f, "{}", attr),
            gate => write!(f, "({})", gate),
        }
    }
}

impl fmt::Display for AccessStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(attr) => write!(f, "{}", attr),
            Self::Gate {
                threshold,
                children,
            } => {
                let n = children.len();
                let joiner = if n > 1 && *threshold == n {
                    Some(" and ")
                } else if n > 1 && *threshold == 1 {
                    Some(" or ")
                } else {
                    None
                };

                match joiner {
                    Some(joiner) => {
                        for (i, child) in children.iter().enumerate() {
                            if i > 0 {
                                f.write_str(joiner)?;
                            }
                            child.fmt_child(f)?;
                        }
                        Ok(())
                    }
                    None => {
                        write!(f, "{} of (", threshold)?;
                        for (i, child) in children.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{}", child)?;
                        }
                        f.write_str(")")
                    }
                }
            }
        }
    }
}

impl FromStr for AccessStructure {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Comma,
    Word(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Comma => ",".into(),
            Token::Word(w) => w.clone(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn tokenize(input: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        let single = match c {
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            ',' => Some(Token::Comma),
            _ => None,
        };

        if let Some(token) = single {
            chars.next();
            tokens.push((pos, token));
        } else if c.is_whitespace() {
            chars.next();
        } else {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_whitespace() || matches!(c, '(' | ')' | ',') {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push((pos, Token::Word(word)));
        }
    }

    tokens
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, want: Token, what: &'static str) -> Result<(), PolicyError> {
        match self.advance() {
            Some((_, token)) if token == want => Ok(()),
            Some((position, token)) => Err(PolicyError::UnexpectedToken {
                found: token.describe(),
                position,
            }),
            None => Err(PolicyError::UnexpectedEnd(what)),
        }
    }

    fn parse_or(&mut self) -> Result<AccessStructure, PolicyError> {
        let mut children = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            children.push(self.parse_and()?);
        }
        Ok(collapse(children, |_| 1))
    }

    fn parse_and(&mut self) -> Result<AccessStructure, PolicyError> {
        let mut children = vec![self.parse_atom()?];
        while self.eat_keyword("and") {
            children.push(self.parse_atom()?);
        }
        Ok(collapse(children, |n| n))
    }

    fn parse_atom(&mut self) -> Result<AccessStructure, PolicyError> {
        match self.advance() {
            None => Err(PolicyError::UnexpectedEnd("attribute or '('")),
            Some((_, Token::Open)) => {
                let inner = self.parse_or()?;
                self.expect(Token::Close, "')'")?;
                Ok(inner)
            }
            Some((position, Token::Word(word))) => {
                if let Ok(threshold) = word.parse::<usize>() {
                    if self.eat_keyword("of") {
                        return self.parse_threshold(threshold);
                    }
                }
                let token = Token::Word(word.clone());
                if ["and", "or", "of"].iter().any(|kw| token.is_keyword(kw)) {
                    return Err(PolicyError::UnexpectedToken {
                        found: word,
                        position,
                    });
                }
                Ok(AccessStructure::Leaf(Attribute::new(word)?))
            }
            Some((position, token)) => Err(PolicyError::UnexpectedToken {
                found: token.describe(),
                position,
            }),
        }
    }

    fn parse_threshold(&mut self, threshold: usize) -> Result<AccessStructure, PolicyError> {
        self.expect(Token::Open, "'(' after 'of'")?;
        let mut children = vec![self.parse_or()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            children.push(self.parse_or()?);
        }
        self.expect(Token::Close, "')'")?;

        if threshold == 0 || threshold > children.len() {
            return Err(PolicyError::InvalidThreshold {
                threshold,
                children: children.len(),
            });
        }
        Ok(AccessStructure::Gate {
            threshold,
            children,
        })
    }
}

/// A single child needs no gate; otherwise wrap with the computed threshold.
fn collapse(
    mut children: Vec<AccessStructure>,
    threshold: impl Fn(usize) -> usize,
) -> AccessStructure {
    if children.len() == 1 {
        children.remove(0)
    } else {
        AccessStructure::Gate {
            threshold: threshold(children.len()),
            children,
        }
    }
}
