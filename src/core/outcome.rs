//! Tagged operation result exchanged with post-operation hooks

use crate::core::error::{GraphError, GraphResult};

/// Result of a resource operation as seen by hooks.
///
/// `Empty` stands for "no result and no error" (for instance a get that
/// found nothing). A hook overriding the result returns a different
/// variant; returning the value it received keeps it unchanged.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Ok(T),
    Err(GraphError),
    Empty,
}

impl<T> Outcome<T> {
    /// Outcome of a lookup where `None` means nothing was found
    pub fn from_option(result: GraphResult<Option<T>>) -> Self {
        match result {
            Ok(Some(v)) => Outcome::Ok(v),
            Ok(None) => Outcome::Empty,
            Err(e) => Outcome::Err(e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(v),
            Outcome::Err(e) => Outcome::Err(e.clone()),
            Outcome::Empty => Outcome::Empty,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Empty => Outcome::Empty,
        }
    }

    /// Convert to a result, turning `Empty` into the given error
    pub fn ok_or(self, empty: GraphError) -> GraphResult<T> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::Err(e) => Err(e),
            Outcome::Empty => Err(empty),
        }
    }

    /// Convert to a result, turning `Empty` into `None`
    pub fn into_result(self) -> GraphResult<Option<T>> {
        match self {
            Outcome::Ok(v) => Ok(Some(v)),
            Outcome::Err(e) => Err(e),
            Outcome::Empty => Ok(None),
        }
    }
}

impl<T> From<GraphResult<T>> for Outcome<T> {
    fn from(result: GraphResult<T>) -> Self {
        match result {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Err(e),
        }
    }
}
