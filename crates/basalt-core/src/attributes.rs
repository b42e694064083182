//! Typed access to node attributes.

use crate::{Error, Result};
use basalt_model::AttributeValue;
use std::collections::HashMap;

/// Read-only view over a node's attributes.
#[derive(Debug, Clone, Copy)]
pub struct AttributeMap<'a> {
    attributes: &'a HashMap<String, AttributeValue>,
}

impl<'a> AttributeMap<'a> {
    pub fn new(attributes: &'a HashMap<String, AttributeValue>) -> Self {
        Self { attributes }
    }

    /// Get a raw attribute value.
    pub fn get(&self, name: &str) -> Option<&'a AttributeValue> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Get an attribute converted to `T`, or `default` when it is absent.
    ///
    /// A present attribute of the wrong type is an error, never silently
    /// replaced by the default.
    pub fn get_or_default<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: TryFrom<AttributeValue, Error = String>,
    {
        match self.attributes.get(name) {
            None => Ok(default),
            Some(value) => T::try_from(value.clone())
                .map_err(|e| Error::Type(format!("attribute '{name}': {e}"))),
        }
    }

    /// Get an integer attribute that encodes a boolean (0 or 1).
    pub fn flag_or_default(&self, name: &str, default: bool) -> Result<bool> {
        match self.get_or_default::<i64>(name, default as i64)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Type(format!(
                "attribute '{name}' must be 0 or 1, got {other}"
            ))),
        }
    }
}
