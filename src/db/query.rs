//! Query-related data models.
//!
//! This module defines the query descriptor, bound parameter values and the
//! small value types returned by or passed to the executor.

use serde_json::Value as JsonValue;

/// A named query: the label used for tracing plus the raw SQL template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query<'q> {
    pub name: &'q str,
    pub raw: &'q str,
}

impl<'q> Query<'q> {
    pub const fn new(name: &'q str, raw: &'q str) -> Self {
        Self { name, raw }
    }
}

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// JSON document
    Json(JsonValue),
}

impl QueryParam {
    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for QueryParam {
                fn from(v: $ty) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for QueryParam {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&String> for QueryParam {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for QueryParam {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Build a `Vec<QueryParam>` from heterogeneous values.
///
/// ```
/// use platform_common::params;
/// use platform_common::db::QueryParam;
///
/// let args = params![42, "Alice", None::<i64>];
/// assert_eq!(args[0], QueryParam::Int(42));
/// assert_eq!(args[2], QueryParam::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::db::QueryParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::db::QueryParam::from($value)),+]
    };
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Only reported by MySQL and SQLite
    pub last_insert_id: Option<i64>,
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION statement
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

/// Options for opening a transaction. The default is the server default
/// isolation in read-write mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// `SET TRANSACTION` statement for these options, if any differ from the
    /// defaults.
    pub fn set_transaction_sql(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(level) = self.isolation {
            parts.push(format!("ISOLATION LEVEL {}", level.to_sql()));
        }
        if self.read_only {
            parts.push("READ ONLY".to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("SET TRANSACTION {}", parts.join(", ")))
        }
    }
}
