//! Identifier management using string interning.
//!
//! Module, connection and layer uids are compared and hashed constantly while
//! layers are organized, so they are interned once and carried around as
//! copyable symbols.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Global string interner for identifier storage.
///
/// # Thread Safety
///
/// This uses `Mutex` for thread-safe access to the string interner.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn with_interner<R>(f: impl FnOnce(&mut DefaultStringInterner) -> R) -> R {
    let mut interner = INTERNER
        .get_or_init(|| Mutex::new(DefaultStringInterner::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut interner)
}

/// Interned identifier of a module, connection, layer or workflow.
///
/// # Examples
///
/// ```
/// use strata_core::identifier::Id;
///
/// let module = Id::new("filter");
/// let other: Id = "filter".into();
/// assert_eq!(module, other);
/// assert_eq!(module, "filter");
///
/// let uid = Id::new("outer").join(">>", Id::new("inner"));
/// assert_eq!(uid, "outer>>inner");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from a string slice, interning it if needed.
    pub fn new(name: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(name)))
    }

    /// Creates an identifier made of `self`, `separator` and `other`.
    ///
    /// Used for the uids of synthesized connections, e.g. `outer>>inner`.
    pub fn join(self, separator: &str, other: Id) -> Self {
        let joined = format!("{self}{separator}{other}");
        Self::new(&joined)
    }

    /// Returns the string this identifier was created from.
    pub fn as_string(self) -> String {
        with_interner(|interner| interner.resolve(self.0).map(str::to_owned)).unwrap_or_default()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&String> for Id {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        with_interner(|interner| interner.resolve(self.0) == Some(other))
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_id() {
        let a = Id::new("module_a");
        let b = Id::new("module_a");
        let c = Id::new("module_c");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_round_trip() {
        let id = Id::new("layer_root");
        assert_eq!(id.to_string(), "layer_root");
        assert_eq!(id.as_string(), "layer_root");
    }

    #[test]
    fn test_join() {
        let joined = Id::new("pool").join(">>", Id::new("worker_0"));
        assert_eq!(joined, "pool>>worker_0");
        assert_eq!(joined, Id::new("pool>>worker_0"));
    }

    #[test]
    fn test_str_comparison() {
        let id: Id = "connection".into();
        assert!(id == "connection");
        assert!(id != "other");
    }
}
