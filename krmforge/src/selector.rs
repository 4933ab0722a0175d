//! The Kubernetes label selector language, used for both label and annotation selectors
//! of patch targets.

use core::fmt;
use std::str::FromStr;

use anyhow::bail;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::manifest::Str;

/// A parsed selector such as `app=web,tier in (front, back),!legacy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Equality(Str, Str),
    /// Also matches when the key is absent.
    Inequality(Str, Str),
    In(Str, IndexSet<Str>),
    /// Also matches when the key is absent.
    NotIn(Str, IndexSet<Str>),
    Exists(Str),
    NotExists(Str),
    /// Every requirement holds. Empty matches everything.
    All(Vec<Selector>),
}

pub trait StringMap {
    fn get(&self, key: &str) -> Option<&str>;

    fn has(&self, key: &str) -> bool;
}

impl<T: StringMap + ?Sized> StringMap for &T {
    fn get(&self, key: &str) -> Option<&str> {
        (*self).get(key)
    }

    fn has(&self, key: &str) -> bool {
        (*self).has(key)
    }
}

impl Selector {
    /// Whether `map` satisfies the selector. An absent map behaves as an empty one.
    pub(crate) fn matches(&self, map: Option<&impl StringMap>) -> bool {
        let get = |key: &str| map.and_then(|m| m.get(key));
        let has = |key: &str| map.is_some_and(|m| m.has(key));
        match self {
            Selector::Equality(key, value) => get(key) == Some(value.as_str()),
            Selector::Inequality(key, value) => get(key) != Some(value.as_str()),
            Selector::In(key, values) => get(key).is_some_and(|v| values.contains(v)),
            Selector::NotIn(key, values) => get(key).is_none_or(|v| !values.contains(v)),
            Selector::Exists(key) => has(key),
            Selector::NotExists(key) => !has(key),
            Selector::All(selectors) => selectors.iter().all(|s| s.matches(map)),
        }
    }
}

struct Parser<'s> {
    lexer: Lexer<'s>,
}

impl Parser<'_> {
    fn value(&mut self, operator: &str) -> anyhow::Result<Str> {
        match self.lexer.next().transpose()? {
            Some(Token::Ident(value)) => Ok(value),
            _ => bail!("expected a value after `{operator}`"),
        }
    }

    fn set(&mut self, operator: &str) -> anyhow::Result<IndexSet<Str>> {
        let Some(Token::LeftParen) = self.lexer.next().transpose()? else {
            bail!("expected `(` after `{operator}`");
        };

        let mut values = IndexSet::new();
        loop {
            let Some(Token::Ident(value)) = self.lexer.next().transpose()? else {
                bail!("expected a value in the set after `{operator}`");
            };
            values.insert(value);
            match self.lexer.next().transpose()? {
                Some(Token::Comma) => continue,
                Some(Token::RightParen) => break,
                _ => bail!("expected `,` or `)` in the set after `{operator}`"),
            }
        }
        Ok(values)
    }

    fn requirement(&mut self) -> anyhow::Result<Option<Selector>> {
        let key = match self.lexer.next().transpose()? {
            None => return Ok(None),
            Some(Token::Not) => match self.lexer.next().transpose()? {
                Some(Token::Ident(key)) => return Ok(Some(Selector::NotExists(key))),
                _ => bail!("expected a key after `!`"),
            },
            Some(Token::Ident(key)) => key,
            Some(token) => bail!("unexpected {token} at the start of a requirement"),
        };

        let selector = match self.lexer.peek()? {
            None | Some(Token::Comma) => Selector::Exists(key),
            Some(_) => match self.lexer.next().transpose()? {
                Some(Token::Equal) => Selector::Equality(key, self.value("=")?),
                Some(Token::NotEqual) => Selector::Inequality(key, self.value("!=")?),
                Some(Token::In) => Selector::In(key, self.set("in")?),
                Some(Token::NotIn) => Selector::NotIn(key, self.set("notin")?),
                Some(token) => bail!("unexpected {token} after key `{key}`"),
                None => Selector::Exists(key),
            },
        };
        Ok(Some(selector))
    }

    fn parse(&mut self) -> anyhow::Result<Selector> {
        let mut selectors = Vec::new();
        while let Some(selector) = self.requirement()? {
            selectors.push(selector);
            match self.lexer.next().transpose()? {
                Some(Token::Comma) => continue,
                Some(token) => bail!("unexpected {token} after a requirement"),
                None => break,
            }
        }

        match selectors.len() {
            1 => Ok(selectors.swap_remove(0)),
            _ => Ok(Selector::All(selectors)),
        }
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Parser {
            lexer: Lexer { input },
        }
        .parse()
    }
}

fn join(values: &IndexSet<Str>) -> String {
    values.iter().map(Str::as_str).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Equality(key, value) => write!(f, "{key}={value}"),
            Selector::Inequality(key, value) => write!(f, "{key}!={value}"),
            Selector::In(key, values) => write!(f, "{key} in ({})", join(values)),
            Selector::NotIn(key, values) => write!(f, "{key} notin ({})", join(values)),
            Selector::Exists(key) => write!(f, "{key}"),
            Selector::NotExists(key) => write!(f, "!{key}"),
            Selector::All(selectors) => {
                for (i, selector) in selectors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{selector}")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Selector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = Str::deserialize(deserializer)?;
        Selector::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug)]
struct Lexer<'s> {
    input: &'s str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(Str),
    Equal,
    NotEqual,
    Not,
    In,
    NotIn,
    Comma,
    LeftParen,
    RightParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(ident) => write!(f, "`{ident}`"),
            Token::Equal => f.write_str("`=`"),
            Token::NotEqual => f.write_str("`!=`"),
            Token::Not => f.write_str("`!`"),
            Token::In => f.write_str("`in`"),
            Token::NotIn => f.write_str("`notin`"),
            Token::Comma => f.write_str("`,`"),
            Token::LeftParen => f.write_str("`(`"),
            Token::RightParen => f.write_str("`)`"),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

impl Lexer<'_> {
    fn peek(&self) -> anyhow::Result<Option<Token>> {
        Lexer { input: self.input }.next().transpose()
    }
}

impl Iterator for Lexer<'_> {
    type Item = anyhow::Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.input = self.input.trim_start();
        let c = self.input.chars().next()?;

        const PREFIXES: &[(&str, Token)] = &[
            ("notin ", Token::NotIn),
            ("notin(", Token::NotIn),
            ("in ", Token::In),
            ("in(", Token::In),
            ("==", Token::Equal),
            ("!=", Token::NotEqual),
            ("!", Token::Not),
            (",", Token::Comma),
            ("(", Token::LeftParen),
            (")", Token::RightParen),
            ("=", Token::Equal),
        ];

        for &(prefix, ref token) in PREFIXES {
            if self.input.starts_with(prefix) {
                // `in(` and `notin(` leave the parenthesis for the next token.
                let len = prefix.trim_end_matches('(').len();
                self.input = &self.input[len..];
                return Some(Ok(token.clone()));
            }
        }

        if !is_ident_char(c) {
            return Some(Err(anyhow::anyhow!("unexpected character `{c}` in selector")));
        }

        let end = self
            .input
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(self.input.len());
        let (ident, rest) = self.input.split_at(end);
        self.input = rest;
        Some(Ok(Token::Ident(ident.into())))
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    impl StringMap for IndexMap<&str, &str> {
        fn get(&self, key: &str) -> Option<&str> {
            IndexMap::get(self, key).copied()
        }

        fn has(&self, key: &str) -> bool {
            self.contains_key(key)
        }
    }

    fn selector(s: &str) -> Selector {
        s.parse().unwrap()
    }

    #[test]
    fn display_round_trips() {
        let selectors = [
            "app=nginx",
            "app in (nginx, redis)",
            "app notin (nginx, redis)",
            "app",
            "!app",
            "app!=nginx",
            "app.kubernetes.io/name=web,env=prod",
            "app!=nginx,!legacy,version in (1.0, 2)",
        ];

        for s in selectors {
            assert_eq!(selector(s).to_string(), s);
        }

        assert_eq!(selector("app==nginx"), selector("app=nginx"));
        assert_eq!(selector("tier in(a,b)"), selector("tier in (a, b)"));
    }

    #[test]
    fn matching() {
        let labels: IndexMap<&str, &str> =
            [("app", "web"), ("tier", "front")].into_iter().collect();
        let labels = Some(&labels);

        assert!(selector("app=web").matches(labels));
        assert!(!selector("app=api").matches(labels));
        assert!(selector("app=web,tier in (front, back)").matches(labels));
        assert!(!selector("app=web,tier notin (front)").matches(labels));
        assert!(selector("env!=prod").matches(labels));
        assert!(selector("env notin (prod)").matches(labels));
        assert!(selector("!env").matches(labels));
        assert!(!selector("!app").matches(labels));
        assert!(!selector("env in (prod)").matches(labels));
    }

    #[test]
    fn absent_maps_are_empty() {
        let none: Option<&IndexMap<&str, &str>> = None;
        assert!(selector("app!=web").matches(none));
        assert!(selector("!app").matches(none));
        assert!(!selector("app").matches(none));
        assert!(Selector::All(vec![]).matches(none));
    }

    #[test]
    fn malformed_selectors() {
        for s in ["=web", "app=", "app in web", "app in (a b)", "app=web extra", "!", "app=@"] {
            assert!(s.parse::<Selector>().is_err(), "{s} should not parse");
        }
    }
}
