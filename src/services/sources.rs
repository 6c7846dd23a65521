//! Round-robin over enrichment profile sources.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// External service a contact profile can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileSource {
    /// FullContact.
    FullContact,
    /// Pipl.
    Pipl,
    /// Clearbit.
    ClearBit,
}

impl ProfileSource {
    /// Short wire code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::FullContact => "fc",
            Self::Pipl => "pp",
            Self::ClearBit => "cb",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FullContact => "FullContact",
            Self::Pipl => "Pipl",
            Self::ClearBit => "Clearbit",
        }
    }
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fc" | "fullcontact" => Ok(Self::FullContact),
            "pp" | "pipl" => Ok(Self::Pipl),
            "cb" | "clearbit" => Ok(Self::ClearBit),
            other => Err(Error::InvalidInput(format!("unknown profile source: {other}"))),
        }
    }
}

/// Profile sources available for one contact, cycled by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSources {
    sources: Vec<ProfileSource>,
    current: usize,
}

impl ProfileSources {
    /// Creates a rotation starting at the first source.
    #[must_use]
    pub const fn new(sources: Vec<ProfileSource>) -> Self {
        Self {
            sources,
            current: 0,
        }
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` when no source has a profile.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The source currently shown.
    #[must_use]
    pub fn current(&self) -> Option<ProfileSource> {
        self.sources.get(self.current).copied()
    }

    /// Advances to the next source, wrapping after the last.
    pub fn next_source(&mut self) -> Option<ProfileSource> {
        if self.sources.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.sources.len();
        self.current()
    }
}
