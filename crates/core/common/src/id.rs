//! Validated dataset and snapshot identifiers.
//!
//! Identifiers are used verbatim as object-store path components, so the
//! rules exist to keep the key space unambiguous: never empty, no path
//! separators, no leading or trailing whitespace.

/// A validated dataset identifier.
///
/// Dataset ids name the top-level container a snapshot belongs to and appear
/// as a single path component in every object key the layout produces.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DatasetId(String);

/// A validated snapshot identifier.
///
/// Snapshot ids identify one immutable commit within a dataset. The writer
/// allocates UUIDv7-based ids, which sort lexicographically in creation
/// order; externally supplied ids only need to satisfy the path-component
/// rules.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SnapshotId(String);

macro_rules! id_impls {
    ($ty:ident) => {
        impl $ty {
            /// Returns a reference to the inner string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the id and returns the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $ty {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl PartialEq<str> for $ty {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $ty {
            fn eq(&self, other: &&str) -> bool {
                self.0 == **other
            }
        }

        impl PartialEq<String> for $ty {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate_id(&value)?;
                Ok($ty(value))
            }
        }

        impl std::str::FromStr for $ty {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate_id(s)?;
                Ok($ty(s.to_string()))
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                value.try_into().map_err(serde::de::Error::custom)
            }
        }
    };
}

id_impls!(DatasetId);
id_impls!(SnapshotId);

/// Validates an identifier used as an object-store path component.
pub fn validate_id(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if let Some(c) = value.chars().find(|&c| c == '/' || c == '\\') {
        return Err(IdError::PathSeparator {
            character: c,
            value: value.to_string(),
        });
    }
    if value.trim() != value {
        return Err(IdError::EdgeWhitespace {
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Error type for identifier parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Identifier is empty.
    #[error("identifier cannot be empty")]
    Empty,
    /// Identifier contains a path separator.
    #[error("identifier '{value}' contains path separator '{character}'")]
    PathSeparator { character: char, value: String },
    /// Identifier has leading or trailing whitespace.
    #[error("identifier '{value}' has leading or trailing whitespace")]
    EdgeWhitespace { value: String },
}

#[cfg(test)]
mod tests {
    use super::{IdError, validate_id};

    #[test]
    fn accept_valid_ids() {
        assert!(validate_id("events").is_ok());
        assert!(validate_id("events_2024").is_ok());
        assert!(validate_id("0198b2a0-0000-7000-8000-000000000000").is_ok());
        assert!(validate_id("with space inside").is_ok());
    }

    #[test]
    fn reject_empty() {
        assert!(matches!(validate_id(""), Err(IdError::Empty)));
    }

    #[test]
    fn reject_path_separators() {
        assert!(matches!(
            validate_id("a/b"),
            Err(IdError::PathSeparator { character: '/', .. })
        ));
        assert!(matches!(
            validate_id("a\\b"),
            Err(IdError::PathSeparator {
                character: '\\',
                ..
            })
        ));
    }

    #[test]
    fn reject_edge_whitespace() {
        assert!(matches!(
            validate_id(" events"),
            Err(IdError::EdgeWhitespace { .. })
        ));
        assert!(matches!(
            validate_id("events\t"),
            Err(IdError::EdgeWhitespace { .. })
        ));
    }
}
