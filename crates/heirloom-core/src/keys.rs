//! Record addressing for the shared record store.
//!
//! Every record lives at an [`Address`] made of a partition key (`pk`) and a sort key (`sk`).
//! Address generation is centralized here so drafts, letters, versions, and the comment and
//! messaging features all share one set of rules:
//!
//! - **Single record**: `DRAFT#{upload_id}` / `METADATA`, `LETTER#{date}` / `CURRENT`
//! - **Time-ordered records**: `LETTER#{date}` / `VERSION#{timestamp}`,
//!   `CONV#{conversation_id}` / `MESSAGE#{timestamp}#{message_id}`
//! - **Range scopes**: an [`AddressPrefix`] names a partition plus a sort key prefix and is
//!   only used to scope queries.
//!
//! Identifier segments are percent-encoded for `#`, `%` and `|`, so an identifier can never
//! forge the separator of another address.

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Characters escaped inside identifier segments.
const SEGMENT: &AsciiSet = &CONTROLS.add(b'#').add(b'%').add(b'|');

const SEPARATOR: char = '#';

/// Sort key of single-record kinds that own their partition.
pub const METADATA: &str = "METADATA";

/// Sort key of a letter's current pointer.
pub const CURRENT: &str = "CURRENT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("{kind} addresses take {expected} identifier(s), got {got}")]
    Arity {
        kind: EntityKind,
        expected: usize,
        got: usize,
    },

    #[error("Empty identifier for {0}")]
    EmptyIdentifier(EntityKind),
}

/// Kinds of records kept in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// `[upload_id]`
    Draft,
    /// Current pointer of a letter: `[date]`
    Letter,
    /// `[date, timestamp]`
    LetterVersion,
    /// `[item_id, timestamp, comment_id]`
    Comment,
    /// `[comment_id, user_id]`
    Reaction,
    /// `[conversation_id]`
    Conversation,
    /// `[conversation_id, timestamp, message_id]`
    Message,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Draft,
        EntityKind::Letter,
        EntityKind::LetterVersion,
        EntityKind::Comment,
        EntityKind::Reaction,
        EntityKind::Conversation,
        EntityKind::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Draft => "draft",
            EntityKind::Letter => "letter",
            EntityKind::LetterVersion => "letter_version",
            EntityKind::Comment => "comment",
            EntityKind::Reaction => "reaction",
            EntityKind::Conversation => "conversation",
            EntityKind::Message => "message",
        }
    }

    /// Number of identifiers needed to address one record of this kind.
    pub fn arity(&self) -> usize {
        match self {
            EntityKind::Draft | EntityKind::Letter | EntityKind::Conversation => 1,
            EntityKind::LetterVersion | EntityKind::Reaction => 2,
            EntityKind::Comment | EntityKind::Message => 3,
        }
    }

    fn partition_tag(&self) -> &'static str {
        match self {
            EntityKind::Draft => "DRAFT",
            EntityKind::Letter | EntityKind::LetterVersion => "LETTER",
            EntityKind::Comment => "ITEM",
            EntityKind::Reaction => "COMMENT",
            EntityKind::Conversation | EntityKind::Message => "CONV",
        }
    }

    /// Sort key prefix shared by every record of this kind inside its partition.
    fn sort_tag(&self) -> &'static str {
        match self {
            EntityKind::Draft | EntityKind::Conversation => METADATA,
            EntityKind::Letter => CURRENT,
            EntityKind::LetterVersion => "VERSION#",
            EntityKind::Comment => "COMMENT#",
            EntityKind::Reaction => "REACTION#",
            EntityKind::Message => "MESSAGE#",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| KeyError::UnknownKind(s.to_string()))
    }
}

/// Location of exactly one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub pk: String,
    pub sk: String,
}

impl Address {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Single-string rendering, `pk|sk`.
    pub fn encoded(&self) -> String {
        format!("{}|{}", self.pk, self.sk)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}|{}", self.pk, self.sk)
    }
}

/// Range scope used by prefix queries. Never names a concrete record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressPrefix {
    pub pk: String,
    pub sk_prefix: String,
}

impl AddressPrefix {
    pub fn matches(&self, address: &Address) -> bool {
        address.pk == self.pk && address.sk.starts_with(&self.sk_prefix)
    }

    pub fn encoded(&self) -> String {
        format!("{}|{}", self.pk, self.sk_prefix)
    }
}

impl Display for AddressPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}|{}", self.pk, self.sk_prefix)
    }
}

fn encode_segment(id: &str) -> String {
    utf8_percent_encode(id, SEGMENT).to_string()
}

fn check_ids(kind: EntityKind, ids: &[&str], expected: usize) -> Result<(), KeyError> {
    if ids.len() != expected {
        return Err(KeyError::Arity {
            kind,
            expected,
            got: ids.len(),
        });
    }
    if ids.iter().any(|id| id.is_empty()) {
        return Err(KeyError::EmptyIdentifier(kind));
    }
    Ok(())
}

fn partition_key(kind: EntityKind, id: &str) -> String {
    format!("{}{}{}", kind.partition_tag(), SEPARATOR, encode_segment(id))
}

/// Derive the address of one record.
///
/// `ids` must hold exactly [`EntityKind::arity`] non-empty identifiers, partition id first.
pub fn derive(kind: EntityKind, ids: &[&str]) -> Result<Address, KeyError> {
    check_ids(kind, ids, kind.arity())?;

    let pk = partition_key(kind, ids[0]);
    let sk = match kind.arity() {
        1 => kind.sort_tag().to_string(),
        _ => {
            let rest: Vec<String> = ids[1..].iter().map(|id| encode_segment(id)).collect();
            format!("{}{}", kind.sort_tag(), rest.join("#"))
        }
    };

    Ok(Address { pk, sk })
}

/// Derive the query scope covering every record of `kind` under one partition id.
///
/// For single-record kinds the scope is the whole partition; for time-ordered kinds it is
/// restricted to that kind's sort key tag.
pub fn prefix_for(kind: EntityKind, ids: &[&str]) -> Result<AddressPrefix, KeyError> {
    check_ids(kind, ids, 1)?;

    let sk_prefix = match kind.arity() {
        1 => String::new(),
        _ => kind.sort_tag().to_string(),
    };

    Ok(AddressPrefix {
        pk: partition_key(kind, ids[0]),
        sk_prefix,
    })
}

/// Address of the draft created for one upload.
pub fn draft(upload_id: &str) -> Result<Address, KeyError> {
    derive(EntityKind::Draft, &[upload_id])
}

/// Address of a letter's current pointer.
pub fn letter_current(date: &str) -> Result<Address, KeyError> {
    derive(EntityKind::Letter, &[date])
}

/// Address of one immutable letter version.
pub fn letter_version(date: &str, timestamp: &str) -> Result<Address, KeyError> {
    derive(EntityKind::LetterVersion, &[date, timestamp])
}

/// Scope covering every version of one letter.
pub fn letter_versions(date: &str) -> Result<AddressPrefix, KeyError> {
    prefix_for(EntityKind::LetterVersion, &[date])
}

/// Sortable timestamp segment: RFC 3339, UTC, millisecond precision.
pub fn sortable_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_sortable_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_same_identifier_different_kinds_never_collide() {
        let draft = derive(EntityKind::Draft, &["abc"]).unwrap();
        let letter = derive(EntityKind::Letter, &["abc"]).unwrap();
        let conversation = derive(EntityKind::Conversation, &["abc"]).unwrap();

        assert_ne!(draft, letter);
        assert_ne!(draft, conversation);
        assert_ne!(letter, conversation);
        assert_ne!(draft.encoded(), letter.encoded());
    }

    #[test]
    fn test_current_and_version_share_partition_but_not_sort_key() {
        let current = letter_current("1943-05-02").unwrap();
        let version = letter_version("1943-05-02", "2025-01-15T10:00:00.000Z").unwrap();

        assert_eq!(current.pk, "LETTER#1943-05-02");
        assert_eq!(current.sk, CURRENT);
        assert_eq!(version.pk, current.pk);
        assert_eq!(version.sk, "VERSION#2025-01-15T10:00:00.000Z");
    }

    #[test]
    fn test_prefix_is_strict_prefix_of_addresses() {
        let prefix = prefix_for(EntityKind::Letter, &["1943-05-02"]).unwrap();
        let current = letter_current("1943-05-02").unwrap();
        assert!(prefix.matches(&current));
        assert!(current.encoded().starts_with(&prefix.encoded()));
        assert_ne!(current.encoded(), prefix.encoded());

        let versions = letter_versions("1943-05-02").unwrap();
        let version = letter_version("1943-05-02", "2025-01-15T10:00:00.000Z").unwrap();
        assert!(versions.matches(&version));
        assert!(!versions.matches(&current));
        assert!(version.encoded().starts_with(&versions.encoded()));

        let draft_scope = prefix_for(EntityKind::Draft, &["u1"]).unwrap();
        let draft = draft("u1").unwrap();
        assert!(draft.encoded().starts_with(&draft_scope.encoded()));
        assert!(draft.encoded().len() > draft_scope.encoded().len());
    }

    #[test]
    fn test_prefix_does_not_leak_into_neighbouring_partition() {
        let versions = letter_versions("1943-05").unwrap();
        let other = letter_version("1943-05-02", "2025-01-15T10:00:00.000Z").unwrap();
        assert!(!versions.matches(&other));
    }

    #[test]
    fn test_separator_inside_identifier_cannot_forge_address() {
        let a = derive(EntityKind::Message, &["user-1#user-2", "t", "m"]).unwrap();
        let b = derive(EntityKind::Message, &["user-1", "user-2#t", "m"]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.pk, "CONV#user-1%23user-2");
    }

    #[test]
    fn test_arity_is_enforced() {
        let err = derive(EntityKind::LetterVersion, &["1943-05-02"]).unwrap_err();
        assert_eq!(
            err,
            KeyError::Arity {
                kind: EntityKind::LetterVersion,
                expected: 2,
                got: 1
            }
        );
        assert!(prefix_for(EntityKind::Comment, &["item", "ts"]).is_err());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert_eq!(
            draft("").unwrap_err(),
            KeyError::EmptyIdentifier(EntityKind::Draft)
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!("Letter".parse::<EntityKind>().unwrap(), EntityKind::Letter);
        assert_eq!(
            "letter_version".parse::<EntityKind>().unwrap(),
            EntityKind::LetterVersion
        );
        assert!(matches!(
            "photo".parse::<EntityKind>(),
            Err(KeyError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_all_kinds_derive_distinct_addresses_for_same_ids() {
        let ids = ["x", "y", "z"];
        let mut seen = std::collections::HashSet::new();
        for kind in EntityKind::ALL {
            let address = derive(kind, &ids[..kind.arity()]).unwrap();
            assert!(seen.insert(address), "duplicate address for {}", kind);
        }
    }

    #[test]
    fn test_sortable_timestamps_order_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);

        let a = sortable_timestamp(earlier);
        let b = sortable_timestamp(later);
        assert_eq!(a, "2025-01-15T10:00:00.000Z");
        assert!(a < b);
        assert_eq!(parse_sortable_timestamp(&b), Some(later));
    }
}
