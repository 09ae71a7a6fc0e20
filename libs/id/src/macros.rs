/// Declares a `{prefix}_{ulid}` identifier type.
///
/// ```ignore
/// define_id!(
///     /// Docs for the type.
///     ScheduleId,
///     "sch"
/// );
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }

            #[must_use]
            pub const fn from_ulid(ulid: $crate::Ulid) -> Self {
                Self(ulid)
            }

            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                $crate::split_id(s, Self::PREFIX).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Splits `{prefix}_{ulid}` and checks the prefix.
#[doc(hidden)]
pub fn split_id(s: &str, prefix: &'static str) -> Result<ulid::Ulid, crate::IdError> {
    if s.is_empty() {
        return Err(crate::IdError::Empty);
    }
    let (found, body) = s
        .split_once('_')
        .ok_or_else(|| crate::IdError::malformed(s, "missing '_' separator"))?;
    if found != prefix {
        return Err(crate::IdError::WrongKind {
            expected: prefix,
            found: found.to_string(),
        });
    }
    body.parse()
        .map_err(|e: ulid::DecodeError| crate::IdError::malformed(s, e.to_string()))
}
