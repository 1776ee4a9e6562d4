//! Repository rules and typed access to their attributes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Failure;
use crate::workspace::WorkspaceAttributeMapper;

/// Attribute holding the primary download URL.
pub const ATTR_URL: &str = "url";
/// Attribute holding mirror URLs, tried in order.
pub const ATTR_URLS: &str = "urls";
/// Attribute holding the expected sha256 of the archive.
pub const ATTR_SHA256: &str = "sha256";
/// Attribute naming a directory prefix to strip from every entry.
pub const ATTR_STRIP_PREFIX: &str = "strip_prefix";
/// Attribute overriding archive format detection.
pub const ATTR_TYPE: &str = "type";

/// Rule kind for HTTP archives.
pub const HTTP_ARCHIVE: &str = "http_archive";

/// A single attribute value as declared in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string.
    String(String),
    /// An integer.
    Int(i64),
    /// A boolean.
    Bool(bool),
    /// A list of strings.
    StringList(Vec<String>),
}

impl AttributeValue {
    /// Human-readable type name, used in type mismatch diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::StringList(_) => "list of strings",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

/// Check that `name` can be used as a directory name under the external root.
///
/// # Errors
///
/// Returns a short reason when the name is empty, contains a path separator
/// or `..`, or starts with `@` or `.`.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("must not be empty");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("must not contain a path separator");
    }
    if name.contains("..") {
        return Err("must not contain '..'");
    }
    if name.starts_with('@') || name.starts_with('.') {
        return Err("must not start with '@' or '.'");
    }
    Ok(())
}

/// One declared external repository.
///
/// Immutable once parsed. Only explicitly written attributes are stored, so
/// presence in the map is what "explicitly specified" means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRule {
    name: String,
    kind: String,
    attributes: BTreeMap<String, AttributeValue>,
}

impl RepositoryRule {
    /// Create a rule with no attributes.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Convenience constructor for an `http_archive` rule.
    #[must_use]
    pub fn http_archive(name: impl Into<String>) -> Self {
        Self::new(HTTP_ARCHIVE, name)
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Unique name in the external namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fail persistently unless the name is a single safe path component.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PersistentCause::InvalidName`] with the reason from
    /// [`validate_name`].
    pub fn check_name(&self) -> Result<(), Failure> {
        validate_name(&self.name).map_err(|reason| Failure::invalid_name(&self.name, reason))
    }

    /// Archive-family tag, e.g. `http_archive`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// All declared attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Typed view of this rule's attributes.
    #[must_use]
    pub fn mapper(&self) -> WorkspaceAttributeMapper<'_> {
        WorkspaceAttributeMapper::new(self)
    }

    /// Stable digest of kind, name and attributes.
    ///
    /// Written to the completion marker so a changed declaration is never
    /// mistaken for an already materialized one.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_bytes());
        hasher.update([0]);
        hasher.update(self.name.as_bytes());
        hasher.update([0]);
        for (key, value) in &self.attributes {
            hasher.update(key.as_bytes());
            hasher.update([0]);
            match value {
                AttributeValue::String(s) => hasher.update(format!("s:{s}")),
                AttributeValue::Int(i) => hasher.update(format!("i:{i}")),
                AttributeValue::Bool(b) => hasher.update(format!("b:{b}")),
                AttributeValue::StringList(items) => {
                    hasher.update(format!("l:{}", items.len()));
                    for item in items {
                        hasher.update([0]);
                        hasher.update(item.as_bytes());
                    }
                }
            }
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RepositoryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(name = \"{}\")", self.kind, self.name)
    }
}

/// Typed, classified access to rule attributes.
///
/// Type mismatches are persistent failures: the user wrote the rule wrong.
pub trait RuleAttributes {
    /// Whether the user wrote this attribute.
    fn is_explicitly_specified(&self, attribute: &str) -> bool;

    /// Read a string attribute.
    ///
    /// # Errors
    ///
    /// Persistent failure if the attribute is missing or not a string.
    fn get_string(&self, attribute: &str) -> Result<String, Failure>;

    /// Read a list-of-strings attribute.
    ///
    /// # Errors
    ///
    /// Persistent failure if the attribute is missing or not a list of strings.
    fn get_string_list(&self, attribute: &str) -> Result<Vec<String>, Failure>;

    /// Read an optional string attribute.
    ///
    /// # Errors
    ///
    /// Persistent failure if the attribute is present but not a string.
    fn get_opt_string(&self, attribute: &str) -> Result<Option<String>, Failure> {
        if self.is_explicitly_specified(attribute) {
            self.get_string(attribute).map(Some)
        } else {
            Ok(None)
        }
    }
}
