//! Typed property setter tables.
//!
//! Residual configuration keys are applied to a target object through a
//! per-variant table mapping each key to a strongly typed setter function.
//! The tables are built once per adapter or pool variant, so "unknown key is
//! a hard error in strict mode" holds without any runtime reflection.
//!
//! Only three value types are supported: boolean, integer, and string. Keys
//! are matched case-sensitively. Application order across keys is
//! unspecified; setters must be independent of one another.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ConfigMap;
use crate::error::{SourceError, SourceResult};

/// A strongly typed setter for one configuration key.
pub enum Setter<T> {
    Bool(fn(&mut T, bool)),
    Int(fn(&mut T, i64)),
    Str(fn(&mut T, String)),
}

/// Static key-to-setter table for one configurable target type.
pub struct SetterTable<T> {
    entries: HashMap<&'static str, Setter<T>>,
}

impl<T> SetterTable<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a boolean-valued property.
    pub fn bool(mut self, key: &'static str, f: fn(&mut T, bool)) -> Self {
        self.entries.insert(key, Setter::Bool(f));
        self
    }

    /// Register an integer-valued property.
    pub fn int(mut self, key: &'static str, f: fn(&mut T, i64)) -> Self {
        self.entries.insert(key, Setter::Int(f));
        self
    }

    /// Register a string-valued property.
    pub fn string(mut self, key: &'static str, f: fn(&mut T, String)) -> Self {
        self.entries.insert(key, Setter::Str(f));
        self
    }

    /// Check whether a key is known to this table.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Apply residual properties to `target`.
    ///
    /// Each key is looked up case-sensitively. A found key has its raw string
    /// value coerced to the setter's declared type and applied in place. An
    /// unknown key fails with `SourceError::UnknownProperty` naming that key
    /// when `strict` is true; with `strict` false it is skipped.
    ///
    /// # Errors
    ///
    /// `SourceError::UnknownProperty` for unknown keys in strict mode;
    /// `SourceError::Configuration` when a value cannot be coerced to the
    /// setter's type (both modes - a known key with a bad value is always a
    /// hard error).
    pub fn apply(&self, target: &mut T, residual: &ConfigMap, strict: bool) -> SourceResult<()> {
        for (key, value) in residual {
            let Some(setter) = self.entries.get(key.as_str()) else {
                if strict {
                    return Err(SourceError::unknown_property(key));
                }
                debug!(key = %key, "Skipping unknown property in non-strict mode");
                continue;
            };

            match setter {
                Setter::Bool(f) => f(target, coerce_bool(key, value)?),
                Setter::Int(f) => f(target, coerce_int(key, value)?),
                Setter::Str(f) => f(target, value.clone()),
            }
        }
        Ok(())
    }
}

impl<T> Default for SetterTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn coerce_bool(key: &str, value: &str) -> SourceResult<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(SourceError::configuration(format!(
            "Property '{key}' expects a boolean, got '{value}'"
        )))
    }
}

fn coerce_int(key: &str, value: &str) -> SourceResult<i64> {
    value.parse::<i64>().map_err(|_| {
        SourceError::configuration(format!(
            "Property '{key}' expects an integer, got '{value}'"
        ))
    })
}
