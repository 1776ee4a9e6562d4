//! `WORKSPACE.toml` parsing and attribute access.
//!
//! A workspace declares rules as arrays of tables keyed by rule kind:
//!
//! ```toml
//! [[http_archive]]
//! name = "png"
//! urls = ["http://x/png.tar.gz"]
//! sha256 = "..."
//! strip_prefix = "png-1.0"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Failure, WorkspaceError};
use crate::rule::{AttributeValue, HTTP_ARCHIVE, RepositoryRule, RuleAttributes, validate_name};

/// Default workspace file name.
pub const WORKSPACE_FILE: &str = "WORKSPACE.toml";

/// Rule kinds a workspace may declare.
pub const RULE_KINDS: &[&str] = &[HTTP_ARCHIVE];

/// Parsed workspace file.
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
    rules: Vec<RepositoryRule>,
}

impl Workspace {
    /// Read and parse a workspace file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or declares invalid rules.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse workspace content. `path` is only used in diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML, unknown rule kinds, invalid or
    /// duplicate names, and attribute values of unsupported types.
    pub fn parse(content: &str, path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let path = path.as_ref().to_path_buf();
        let table: toml::Table = toml::from_str(content).map_err(|source| WorkspaceError::Parse {
            path: path.clone(),
            source,
        })?;

        let mut rules = Vec::new();
        let mut names = BTreeSet::new();
        for (kind, value) in table {
            if !RULE_KINDS.contains(&kind.as_str()) {
                return Err(WorkspaceError::InvalidRule {
                    kind,
                    index: 0,
                    message: format!("unknown rule kind (expected one of: {})", RULE_KINDS.join(", ")),
                });
            }
            let toml::Value::Array(entries) = value else {
                return Err(WorkspaceError::InvalidRule {
                    kind,
                    index: 0,
                    message: "rules must be declared as an array of tables".to_string(),
                });
            };
            for (index, entry) in entries.into_iter().enumerate() {
                let rule = parse_rule(&kind, index, entry)?;
                if !names.insert(rule.name().to_string()) {
                    return Err(WorkspaceError::DuplicateName {
                        name: rule.name().to_string(),
                    });
                }
                rules.push(rule);
            }
        }

        tracing::debug!(path = %path.display(), rules = rules.len(), "Parsed workspace");
        Ok(Self { path, rules })
    }

    /// Path the workspace was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All declared rules, in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[RepositoryRule] {
        &self.rules
    }

    /// Rule named `name`.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&RepositoryRule> {
        self.rules.iter().find(|rule| rule.name() == name)
    }

    /// Rules named in `names`, or every rule when `names` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::UnknownRule`] for a name no rule declares.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<RepositoryRule>, WorkspaceError> {
        if names.is_empty() {
            return Ok(self.rules.clone());
        }
        names
            .iter()
            .map(|name| {
                self.rule(name.as_ref())
                    .cloned()
                    .ok_or_else(|| WorkspaceError::UnknownRule {
                        name: name.as_ref().to_string(),
                    })
            })
            .collect()
    }
}

fn parse_rule(kind: &str, index: usize, entry: toml::Value) -> Result<RepositoryRule, WorkspaceError> {
    let invalid = |message: String| WorkspaceError::InvalidRule {
        kind: kind.to_string(),
        index,
        message,
    };

    let toml::Value::Table(mut table) = entry else {
        return Err(invalid("expected a table".to_string()));
    };
    let name = match table.remove("name") {
        Some(toml::Value::String(name)) => name,
        Some(other) => {
            return Err(invalid(format!("'name' must be a string, got {}", other.type_str())));
        }
        None => return Err(invalid("missing 'name'".to_string())),
    };
    validate_name(&name).map_err(|reason| invalid(format!("invalid name '{name}': {reason}")))?;

    let mut rule = RepositoryRule::new(kind, name);
    for (attribute, value) in table {
        let value = convert_value(&value).ok_or_else(|| {
            invalid(format!(
                "attribute '{attribute}' has unsupported type {}",
                value.type_str()
            ))
        })?;
        rule = rule.with_attribute(attribute, value);
    }
    Ok(rule)
}

fn convert_value(value: &toml::Value) -> Option<AttributeValue> {
    match value {
        toml::Value::String(s) => Some(AttributeValue::String(s.clone())),
        toml::Value::Integer(i) => Some(AttributeValue::Int(*i)),
        toml::Value::Boolean(b) => Some(AttributeValue::Bool(*b)),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(AttributeValue::StringList),
        _ => None,
    }
}

/// [`RuleAttributes`] over a rule parsed from a workspace.
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceAttributeMapper<'a> {
    rule: &'a RepositoryRule,
}

impl<'a> WorkspaceAttributeMapper<'a> {
    /// View `rule`'s attributes.
    #[must_use]
    pub fn new(rule: &'a RepositoryRule) -> Self {
        Self { rule }
    }

    fn lookup(&self, attribute: &str) -> Result<&'a AttributeValue, Failure> {
        self.rule
            .attributes()
            .get(attribute)
            .ok_or_else(|| Failure::missing_attribute(attribute))
    }
}

impl RuleAttributes for WorkspaceAttributeMapper<'_> {
    fn is_explicitly_specified(&self, attribute: &str) -> bool {
        self.rule.attributes().contains_key(attribute)
    }

    fn get_string(&self, attribute: &str) -> Result<String, Failure> {
        match self.lookup(attribute)? {
            AttributeValue::String(value) => Ok(value.clone()),
            other => Err(Failure::invalid_attribute(attribute, "a string", other.type_name())),
        }
    }

    fn get_string_list(&self, attribute: &str) -> Result<Vec<String>, Failure> {
        match self.lookup(attribute)? {
            AttributeValue::StringList(values) => Ok(values.clone()),
            other => Err(Failure::invalid_attribute(
                attribute,
                "a list of strings",
                other.type_name(),
            )),
        }
    }
}
