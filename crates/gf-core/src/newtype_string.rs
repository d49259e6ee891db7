//! Macro for defining strongly-typed identifier newtypes.
//!
//! Dataset ids and pipeline names end up inside SQL identifiers, schema names
//! and file names, so every newtype shares one invariant: a non-empty string
//! made of ASCII letters, digits and underscores. The macro generates the
//! struct plus Display, Deref, AsRef, Borrow, TryFrom, PartialEq and serde
//! impls from a single invocation.

/// Returns true when `s` is usable as a bare SQL identifier component.
pub(crate) fn is_valid_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Define a strongly-typed, identifier-safe string newtype.
macro_rules! define_ident_newtype {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::try_new(s.clone()).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        concat!(
                            "invalid ",
                            stringify!($Name),
                            " '{}': use letters, digits and underscores"
                        ),
                        s
                    ))
                })
            }
        }

        impl $Name {
            /// Create a new instance, panicking if the value is not a valid identifier.
            ///
            /// Prefer [`try_new`](Self::try_new) when handling untrusted input.
            pub fn new(name: impl Into<String>) -> Self {
                let s = name.into();
                assert!(
                    $crate::newtype_string::is_valid_ident(&s),
                    concat!("invalid ", stringify!($Name), ": {}"),
                    s
                );
                Self(s)
            }

            /// Try to create a new instance, returning `None` for invalid identifiers.
            pub fn try_new(name: impl Into<String>) -> Option<Self> {
                let s = name.into();
                if $crate::newtype_string::is_valid_ident(&s) {
                    Some(Self(s))
                } else {
                    None
                }
            }

            /// Return the underlying value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $Name {
            type Error = String;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::try_new(s)
                    .ok_or_else(|| format!(concat!("invalid ", stringify!($Name), ": '{}'"), s))
            }
        }

        impl TryFrom<String> for $Name {
            type Error = String;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::try_from(s.as_str())
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

pub(crate) use define_ident_newtype;
