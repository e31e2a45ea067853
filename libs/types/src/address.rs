//! Hierarchical Addresses
//!
//! An address is an ordered, non-empty list of string segments. The first
//! segment is the *prefix*: the identity of the shuttle that owns everything
//! below it. Remaining segments descend into actors and their sub-addresses.
//!
//! ## Wire Format
//!
//! ```text
//! segment(":"segment)*
//! ```
//!
//! Inside a segment the separator and the escape character are written as
//! `\:` and `\\`. Any other escape, or a trailing lone `\`, is malformed.
//! The empty string is the root address: one empty segment, not zero.
//!
//! ```rust
//! use courier_types::Address;
//!
//! let addr: Address = "runner:echo:req\\:1".parse().unwrap();
//! assert_eq!(addr.len(), 3);
//! assert_eq!(addr.segment(2), Some("req:1"));
//! assert_eq!(addr.to_string(), "runner:echo:req\\:1");
//! ```

use crate::error::AddressError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between segments in the string form
pub const SEPARATOR: char = ':';

/// Escape character used inside segments
pub const ESCAPE: char = '\\';

/// Immutable hierarchical identifier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    segments: Vec<String>,
}

impl Address {
    /// Build an address from segments. Fails when no segments are supplied.
    pub fn of<I, S>(segments: I) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(AddressError::invalid_address(
                "",
                "an address needs at least one segment",
            ));
        }
        Ok(Self { segments })
    }

    /// Single-segment address, typically a shuttle prefix
    pub fn from_segment(segment: impl Into<String>) -> Self {
        Self {
            segments: vec![segment.into()],
        }
    }

    /// The root address: a single empty segment
    pub fn root() -> Self {
        Self::from_segment("")
    }

    /// Parse the escaped string form
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = input.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(escaped @ (SEPARATOR | ESCAPE)) => current.push(escaped),
                    Some(other) => {
                        return Err(AddressError::invalid_address(
                            input,
                            format!("unknown escape sequence '\\{}'", other),
                        ))
                    }
                    None => {
                        return Err(AddressError::invalid_address(
                            input,
                            "dangling escape character at end of input",
                        ))
                    }
                },
                SEPARATOR => segments.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        segments.push(current);

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (always at least 1)
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; present so `len` has its usual companion
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// The prefix segment, used for shuttle routing
    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// True iff `other` begins with all of this address's segments.
    /// An address is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Address) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// True iff the first segment equals `segment`
    pub fn starts_with_segment(&self, segment: &str) -> bool {
        self.first() == segment
    }

    /// Segments of `self` that follow `parent`.
    ///
    /// Errors when `parent` is not a prefix, or when it equals `self` (the
    /// result would have no segments).
    pub fn remove_prefix(&self, parent: &Address) -> Result<Address, AddressError> {
        if !parent.is_prefix_of(self) {
            return Err(AddressError::invalid_argument(format!(
                "'{}' is not a prefix of '{}'",
                parent, self
            )));
        }
        if parent.len() == self.len() {
            return Err(AddressError::invalid_argument(format!(
                "cannot relativize '{}' to nothing",
                self
            )));
        }
        Ok(Self {
            segments: self.segments[parent.len()..].to_vec(),
        })
    }

    /// Drop the last `count` segments; at least one segment must remain
    pub fn remove_suffix(&self, count: usize) -> Result<Address, AddressError> {
        if count >= self.segments.len() {
            return Err(AddressError::invalid_argument(format!(
                "cannot remove {} segment(s) from '{}' ({} segment(s))",
                count,
                self,
                self.segments.len()
            )));
        }
        Ok(Self {
            segments: self.segments[..self.segments.len() - count].to_vec(),
        })
    }

    /// Concatenate `child` below this address
    pub fn append(&self, child: &Address) -> Address {
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        Self { segments }
    }

    pub fn append_segment(&self, segment: impl Into<String>) -> Address {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, segment: &str) -> fmt::Result {
    for c in segment.chars() {
        if c == SEPARATOR || c == ESCAPE {
            write!(f, "{}", ESCAPE)?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write_escaped(f, segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}
