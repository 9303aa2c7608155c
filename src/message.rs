// MIT License
// Copyright 2017--present xhal developers

//! Named request/response messages.
//!
//! An [`RpcMessage`] is a method name plus a bag of named, typed fields. The
//! same type carries requests (method set, arguments as fields) and responses
//! (method echoed, results as fields). A response with an `"error"` key
//! signals a failure reported by the board.

use std::collections::BTreeMap;

/// Key under which the remote side reports a failure.
pub const ERROR_KEY: &str = "error";

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Word(u32),
    WordArray(Vec<u32>),
    String(String),
    StringArray(Vec<String>),
}

/// A named request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcMessage {
    method: String,
    fields: BTreeMap<String, Value>,
}

impl RpcMessage {
    /// Start a request for `method`, e.g. `"optohybrid.broadcastRead"`.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_word(&mut self, key: impl Into<String>, value: u32) -> &mut Self {
        self.set(key, Value::Word(value))
    }

    pub fn set_word_array(&mut self, key: impl Into<String>, values: Vec<u32>) -> &mut Self {
        self.set(key, Value::WordArray(values))
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(key, Value::String(value.into()))
    }

    pub fn set_string_array(&mut self, key: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.set(key, Value::StringArray(values))
    }

    /// Insert or replace a field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn key_exists(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_word(&self, key: &str) -> Option<u32> {
        match self.fields.get(key) {
            Some(Value::Word(w)) => Some(*w),
            _ => None,
        }
    }

    pub fn get_word_array(&self, key: &str) -> Option<&[u32]> {
        match self.fields.get(key) {
            Some(Value::WordArray(w)) => Some(w),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_string_array(&self, key: &str) -> Option<&[String]> {
        match self.fields.get(key) {
            Some(Value::StringArray(s)) => Some(s),
            _ => None,
        }
    }

    /// The board-reported error, if any.
    ///
    /// A non-string `"error"` field still counts as an error; its value is
    /// rendered with `Debug` so the message is never lost.
    pub fn error(&self) -> Option<String> {
        match self.fields.get(ERROR_KEY)? {
            Value::String(s) => Some(s.clone()),
            other => Some(format!("{other:?}")),
        }
    }

    /// Iterate over the fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
