use std::str::FromStr;

use crate::error::{Result, StanzaError};
use crate::jid::Jid;
use crate::node::{Attrs, Node};

/// Reads typed attributes off a node, collecting errors instead of failing
/// on the first one.
pub struct AttrParser<'a> {
    pub attrs: &'a Attrs,
    pub errors: Vec<StanzaError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self {
            attrs: &node.attrs,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&self) -> Result<()> {
        if self.ok() {
            Ok(())
        } else {
            Err(StanzaError::AttrList(self.errors.clone()))
        }
    }

    fn get_raw(&self, key: &str) -> Option<&'a str> {
        self.attrs.get(key)
    }

    // --- String ---
    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.get_raw(key)
    }

    /// Get a required string attribute, returning an error if missing.
    pub fn required_string(&mut self, key: &str) -> Result<&'a str> {
        self.optional_string(key)
            .ok_or_else(|| StanzaError::MissingAttr(key.to_string()))
    }

    // --- JID ---
    pub fn optional_jid(&mut self, key: &str) -> Option<Jid> {
        self.get_raw(key)
            .and_then(|s| match Jid::from_str(s) {
                Ok(jid) => Some(jid),
                Err(e) => {
                    self.errors.push(StanzaError::from(e));
                    None
                }
            })
    }

    // --- Boolean ---
    /// XML schema booleans: `true`/`false`/`1`/`0`.
    pub fn optional_bool(&mut self, key: &str) -> Option<bool> {
        self.get_raw(key).and_then(|s| match s {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                self.errors.push(StanzaError::AttrParse(format!(
                    "Failed to parse bool from '{other}' for key '{key}'"
                )));
                None
            }
        })
    }

    // --- Numbers ---
    pub fn optional_u32(&mut self, key: &str) -> Option<u32> {
        self.parse_number(key)
    }

    pub fn optional_u16(&mut self, key: &str) -> Option<u16> {
        self.parse_number(key)
    }

    pub fn optional_u8(&mut self, key: &str) -> Option<u8> {
        self.parse_number(key)
    }

    fn parse_number<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_raw(key)
            .and_then(|s| match s.parse::<T>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(StanzaError::AttrParse(format!(
                        "Failed to parse number from '{s}' for key '{key}': {e}"
                    )));
                    None
                }
            })
    }
}
