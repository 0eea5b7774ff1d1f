//! Strongly typed identifiers used throughout the content model.

use std::fmt;

/// Forum short name (e.g. `"rust"`). Cheap to clone; forums are few and
/// long-lived, so this stays a plain owned string rather than an interned
/// handle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fname(pub String);

impl Fname {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fname {
    fn from(s: String) -> Self {
        Fname(s)
    }
}

impl From<&str> for Fname {
    fn from(s: &str) -> Self {
        Fname(s.to_owned())
    }
}

impl fmt::Display for Fname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier; equal to the owning thread's [`Pid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Tid(pub u64);

impl Tid {
    pub fn as_pid(self) -> Pid {
        Pid(self.0)
    }
}

impl From<u64> for Tid {
    fn from(v: u64) -> Self {
        Tid(v)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique content identifier, shared by threads, posts, and
/// comments alike (a thread's `pid == tid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Pid(pub u64);

impl Pid {
    pub fn as_tid(self) -> Tid {
        Tid(self.0)
    }
}

impl From<u64> for Pid {
    fn from(v: u64) -> Self {
        Pid(v)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Forum-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub u64);

impl From<u64> for UserId {
    fn from(v: u64) -> Self {
        UserId(v)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "sqlx")]
mod sqlx_impls {
    use super::{Fname, Pid, Tid, UserId};
    use sqlx::{Database, Decode, Encode, Type};

    macro_rules! sqlx_newtype_i64 {
        ($ty:ident) => {
            impl<DB: Database> Type<DB> for $ty
            where
                i64: Type<DB>,
            {
                fn type_info() -> DB::TypeInfo {
                    <i64 as Type<DB>>::type_info()
                }
            }

            impl<'q, DB: Database> Encode<'q, DB> for $ty
            where
                i64: Encode<'q, DB>,
            {
                fn encode_by_ref(
                    &self,
                    buf: &mut <DB as Database>::ArgumentBuffer<'q>,
                ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                    (self.0 as i64).encode_by_ref(buf)
                }
            }

            impl<'r, DB: Database> Decode<'r, DB> for $ty
            where
                i64: Decode<'r, DB>,
            {
                fn decode(
                    value: <DB as Database>::ValueRef<'r>,
                ) -> Result<Self, sqlx::error::BoxDynError> {
                    Ok($ty(i64::decode(value)? as u64))
                }
            }
        };
    }

    sqlx_newtype_i64!(Pid);
    sqlx_newtype_i64!(Tid);
    sqlx_newtype_i64!(UserId);

    impl<DB: Database> Type<DB> for Fname
    where
        String: Type<DB>,
    {
        fn type_info() -> DB::TypeInfo {
            <String as Type<DB>>::type_info()
        }
    }

    impl<'q, DB: Database> Encode<'q, DB> for Fname
    where
        String: Encode<'q, DB>,
    {
        fn encode_by_ref(
            &self,
            buf: &mut <DB as Database>::ArgumentBuffer<'q>,
        ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
            self.0.encode_by_ref(buf)
        }
    }

    impl<'r, DB: Database> Decode<'r, DB> for Fname
    where
        String: Decode<'r, DB>,
    {
        fn decode(
            value: <DB as Database>::ValueRef<'r>,
        ) -> Result<Self, sqlx::error::BoxDynError> {
            Ok(Fname(String::decode(value)?))
        }
    }
}
