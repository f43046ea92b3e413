//! Ranked transform registrations with a cached per-key merge.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::shared::{ConfigurationError, Rank, Token, TokenKind};

use super::AsyncTransform;

/// Which tokens a registration applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Any,
    Tag,
    Text,
    Newline,
    Comment,
    End,
}

impl From<TokenKind> for TransformKind {
    fn from(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Tag => TransformKind::Tag,
            TokenKind::Text => TransformKind::Text,
            TokenKind::Newline => TransformKind::Newline,
            TokenKind::Comment => TransformKind::Comment,
            TokenKind::End => TransformKind::End,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum TransformKey {
    Tag(String),
    Text,
    Newline,
    Comment,
    End,
}

impl TransformKey {
    fn for_token(token: &Token) -> Self {
        match token {
            Token::OpenTag(tag) | Token::EndTag(tag) | Token::SelfClosingTag(tag) => {
                TransformKey::Tag(tag.name.to_ascii_lowercase())
            }
            Token::Text(_) => TransformKey::Text,
            Token::Newline { .. } => TransformKey::Newline,
            Token::Comment { .. } => TransformKey::Comment,
            Token::EndOfInput => TransformKey::End,
        }
    }

    /// `Ok(None)` selects the "any" list.
    fn for_registration(
        name: &str,
        kind: TransformKind,
        tag_name: Option<&str>,
    ) -> Result<Option<Self>, ConfigurationError> {
        let key = match kind {
            TransformKind::Any => None,
            TransformKind::Tag => match tag_name {
                Some(tag) => Some(TransformKey::Tag(tag.to_ascii_lowercase())),
                None => {
                    return Err(ConfigurationError::MissingTagName {
                        name: name.to_string(),
                    });
                }
            },
            TransformKind::Text => Some(TransformKey::Text),
            TransformKind::Newline => Some(TransformKey::Newline),
            TransformKind::Comment => Some(TransformKey::Comment),
            TransformKind::End => Some(TransformKey::End),
        };
        if kind != TransformKind::Tag && tag_name.is_some() {
            log::debug!(
                target: "wt2html.async",
                "transform `{name}`: tag name ignored for {kind:?} registration"
            );
        }
        Ok(key)
    }
}

impl fmt::Display for TransformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKey::Tag(name) => write!(f, "tag:{name}"),
            TransformKey::Text => f.write_str("text"),
            TransformKey::Newline => f.write_str("newline"),
            TransformKey::Comment => f.write_str("comment"),
            TransformKey::End => f.write_str("end"),
        }
    }
}

#[derive(Clone)]
pub struct Registration {
    pub rank: Rank,
    pub name: Rc<str>,
    pub handler: Rc<dyn AsyncTransform>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("rank", &self.rank)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Applicable transforms for one token, ascending by rank.
#[derive(Clone, Debug)]
pub struct TransformList {
    transforms: Rc<[Registration]>,
    first: usize,
}

impl TransformList {
    pub fn iter(&self) -> std::slice::Iter<'_, Registration> {
        self.transforms[self.first..].iter()
    }

    pub fn is_empty(&self) -> bool {
        self.first >= self.transforms.len()
    }

    pub fn len(&self) -> usize {
        self.transforms.len() - self.first
    }
}

#[derive(Debug)]
struct CacheEntry {
    any_generation: u64,
    key_generation: u64,
    transforms: Rc<[Registration]>,
}

/// Transform registrations of one manager.
///
/// Lists are kept sorted by rank. The merged "specific + any" list is cached
/// per key and checked against generation counters that every registration
/// change bumps.
#[derive(Debug, Default)]
pub struct TransformRegistry {
    any: Vec<Registration>,
    keyed: HashMap<TransformKey, Vec<Registration>>,
    any_generation: u64,
    key_generations: HashMap<TransformKey, u64>,
    cache: HashMap<TransformKey, CacheEntry>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transform(
        &mut self,
        handler: Rc<dyn AsyncTransform>,
        name: &str,
        rank: f64,
        kind: TransformKind,
        tag_name: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        let rank = Rank::new(rank)?;
        let key = TransformKey::for_registration(name, kind, tag_name)?;
        let registration = Registration {
            rank,
            name: Rc::from(name),
            handler,
        };
        let list = match &key {
            Some(key) => self.keyed.entry(key.clone()).or_default(),
            None => &mut self.any,
        };
        let pos = list.partition_point(|r| r.rank < rank);
        if list.get(pos).is_some_and(|r| r.rank == rank) {
            return Err(ConfigurationError::DuplicateTransform {
                name: name.to_string(),
                rank,
                key: key.map_or_else(|| "any".to_string(), |k| k.to_string()),
            });
        }
        list.insert(pos, registration);
        log::debug!(target: "wt2html.async", "registered `{name}` rank={rank} kind={kind:?}");
        self.bump(key);
        Ok(())
    }

    /// Removes the registration at `rank` for the key; returns whether one
    /// was present.
    pub fn remove_transform(
        &mut self,
        rank: f64,
        kind: TransformKind,
        tag_name: Option<&str>,
    ) -> bool {
        let Ok(key) = TransformKey::for_registration("<remove>", kind, tag_name) else {
            return false;
        };
        let list = match &key {
            Some(key) => match self.keyed.get_mut(key) {
                Some(list) => list,
                None => return false,
            },
            None => &mut self.any,
        };
        let before = list.len();
        list.retain(|r| r.rank.value() != rank);
        let removed = list.len() != before;
        if removed {
            self.bump(key);
        }
        removed
    }

    fn bump(&mut self, key: Option<TransformKey>) {
        match key {
            Some(key) => *self.key_generations.entry(key).or_insert(0) += 1,
            None => self.any_generation += 1,
        }
    }

    /// Transforms for `token` with rank above `min_rank` (all of them when
    /// the token is unstamped).
    pub fn transforms_for(&mut self, token: &Token, min_rank: Option<Rank>) -> TransformList {
        let key = TransformKey::for_token(token);
        let key_generation = self.key_generations.get(&key).copied().unwrap_or(0);
        let transforms = match self.cache.get(&key) {
            Some(entry)
                if entry.any_generation == self.any_generation
                    && entry.key_generation == key_generation =>
            {
                Rc::clone(&entry.transforms)
            }
            _ => {
                let merged = self.merge(&key);
                self.cache.insert(
                    key,
                    CacheEntry {
                        any_generation: self.any_generation,
                        key_generation,
                        transforms: Rc::clone(&merged),
                    },
                );
                merged
            }
        };
        let first = match min_rank {
            Some(min) => transforms.partition_point(|r| r.rank <= min),
            None => 0,
        };
        TransformList { transforms, first }
    }

    /// Specific transforms first on rank ties.
    fn merge(&self, key: &TransformKey) -> Rc<[Registration]> {
        let specific = self.keyed.get(key).map(Vec::as_slice).unwrap_or(&[]);
        let mut merged = Vec::with_capacity(specific.len() + self.any.len());
        let (mut i, mut j) = (0, 0);
        while i < specific.len() || j < self.any.len() {
            let take_specific = match (specific.get(i), self.any.get(j)) {
                (Some(s), Some(a)) => s.rank <= a.rank,
                (Some(_), None) => true,
                _ => false,
            };
            if take_specific {
                merged.push(specific[i].clone());
                i += 1;
            } else {
                merged.push(self.any[j].clone());
                j += 1;
            }
        }
        Rc::from(merged)
    }

    pub fn has_transforms_for(&self, kind: TokenKind) -> bool {
        if !self.any.is_empty() {
            return true;
        }
        match kind {
            TokenKind::Tag => self
                .keyed
                .iter()
                .any(|(key, list)| matches!(key, TransformKey::Tag(_)) && !list.is_empty()),
            TokenKind::Text => self.keyed.get(&TransformKey::Text).is_some_and(|l| !l.is_empty()),
            TokenKind::Newline => self
                .keyed
                .get(&TransformKey::Newline)
                .is_some_and(|l| !l.is_empty()),
            TokenKind::Comment => self
                .keyed
                .get(&TransformKey::Comment)
                .is_some_and(|l| !l.is_empty()),
            TokenKind::End => self.keyed.get(&TransformKey::End).is_some_and(|l| !l.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.keyed.values().all(Vec::is_empty)
    }
}
