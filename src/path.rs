//! Field paths and identifier mangling.
//!
//! A [`FieldPath`] locates one value inside a nested configuration tree as a
//! sequence of field names and list indices. The [`Mangler`] flattens a path
//! into a single string usable as an HTML form element name, and parses such
//! a string back. The two directions are exact inverses for every path a
//! validated schema can produce.

use std::fmt;

use thiserror::Error;

/// Default marker character joining path segments in a mangled identifier.
///
/// `:` cannot legally appear inside an HTML element id, and schema
/// validation forbids it inside field names, so no escaping is needed.
pub const DEFAULT_MARKER: char = ':';

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A named field of a message type.
    Name(String),
    /// An element index inside a repeated field.
    Index(usize),
}

impl Segment {
    /// Shorthand for a name segment.
    pub fn name(s: impl Into<String>) -> Self {
        Segment::Name(s.into())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(n) => f.write_str(n),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Ordered sequence of segments locating one value in a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(pub Vec<Segment>);

impl FieldPath {
    /// The empty path, addressing the root object itself.
    pub fn root() -> Self {
        FieldPath(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Returns a new path extended by a field name.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segs = self.0.clone();
        segs.push(Segment::Name(name.into()));
        FieldPath(segs)
    }

    /// Returns a new path extended by a list index.
    pub fn element(&self, index: usize) -> Self {
        let mut segs = self.0.clone();
        segs.push(Segment::Index(index));
        FieldPath(segs)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl From<Vec<Segment>> for FieldPath {
    fn from(segs: Vec<Segment>) -> Self {
        FieldPath(segs)
    }
}

/// Errors from converting between field paths and mangled identifiers.
///
/// Both variants indicate a schema or template bug, not bad user input:
/// validated schemas cannot produce paths that fail to mangle, and ids
/// emitted by the classifier always unmangle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A name segment violates the separator contract.
    #[error("invalid name segment {name:?}: {reason}")]
    InvalidSegment { name: String, reason: String },
    /// The empty path addresses the root object, which is not an editable
    /// leaf and has no identifier.
    #[error("cannot mangle an empty path")]
    EmptyPath,
    /// An identifier cannot be parsed back into a field path.
    #[error("malformed identifier {id:?}: {reason}")]
    MalformedId { id: String, reason: String },
}

/// Converts field paths to flat form-element identifiers and back.
///
/// The mapping is a pure, stateless bijection: segments are joined with a
/// single marker character that is forbidden inside field names, so no
/// escaping machinery is involved. Each [`Mangler`] is parameterized by its
/// marker at construction; a schema validated for one marker must be
/// re-validated before use with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mangler {
    marker: char,
}

impl Default for Mangler {
    fn default() -> Self {
        Mangler {
            marker: DEFAULT_MARKER,
        }
    }
}

impl Mangler {
    pub fn new(marker: char) -> Self {
        Mangler { marker }
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    /// Joins a path's segments into one mangled identifier.
    ///
    /// Name segments are rendered verbatim, index segments as decimal
    /// digits. Fails on the empty path, or if a name segment is empty,
    /// contains the marker, or consists only of digits (which would parse
    /// back as an index).
    pub fn mangle(&self, path: &FieldPath) -> Result<String, PathError> {
        if path.is_empty() {
            return Err(PathError::EmptyPath);
        }
        let mut id = String::new();
        for (i, seg) in path.segments().iter().enumerate() {
            if i > 0 {
                id.push(self.marker);
            }
            match seg {
                Segment::Name(name) => {
                    self.check_name(name)?;
                    id.push_str(name);
                }
                Segment::Index(index) => {
                    id.push_str(&index.to_string());
                }
            }
        }
        Ok(id)
    }

    /// Splits a mangled identifier back into a field path.
    ///
    /// Tokens consisting only of decimal digits become index segments,
    /// everything else a name segment. Fails on an empty identifier or an
    /// empty segment (two consecutive markers).
    pub fn unmangle(&self, id: &str) -> Result<FieldPath, PathError> {
        if id.is_empty() {
            return Err(PathError::MalformedId {
                id: id.into(),
                reason: "empty identifier".into(),
            });
        }
        let mut segs = Vec::new();
        for token in id.split(self.marker) {
            if token.is_empty() {
                return Err(PathError::MalformedId {
                    id: id.into(),
                    reason: "empty segment".into(),
                });
            }
            if token.bytes().all(|b| b.is_ascii_digit()) {
                let index = token.parse::<usize>().map_err(|_| PathError::MalformedId {
                    id: id.into(),
                    reason: format!("index {token:?} out of range"),
                })?;
                segs.push(Segment::Index(index));
            } else {
                segs.push(Segment::Name(token.to_string()));
            }
        }
        Ok(FieldPath(segs))
    }

    /// Validates a single field name against the separator contract.
    pub fn check_name(&self, name: &str) -> Result<(), PathError> {
        if name.is_empty() {
            return Err(PathError::InvalidSegment {
                name: name.into(),
                reason: "empty field name".into(),
            });
        }
        if name.contains(self.marker) {
            return Err(PathError::InvalidSegment {
                name: name.into(),
                reason: format!("contains reserved marker {:?}", self.marker),
            });
        }
        if name.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PathError::InvalidSegment {
                name: name.into(),
                reason: "all-digit name would parse as an index".into(),
            });
        }
        Ok(())
    }
}
