//! Chain configuration
//!
//! Holds the ordered building-block names for the outgoing direction; the
//! incoming direction is always the same list read backwards, so it is
//! derived rather than stored.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// A configured block name has no resolved instance.
    #[error("no building block instance for configured name '{name}'")]
    UnknownBlock { name: String },

    #[error("chain configuration is empty")]
    EmptyChain,

    #[error("netlet is missing its {endpoint} endpoint")]
    MissingEndpoint { endpoint: &'static str },
}

/// Ordered building-block names, outgoing direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainConfig {
    outgoing: Vec<String>,
}

impl ChainConfig {
    pub fn new(outgoing: Vec<String>) -> Self {
        ChainConfig { outgoing }
    }

    /// Appends a block at the network end of the outgoing direction.
    pub fn push_back(&mut self, name: impl Into<String>) {
        self.outgoing.push(name.into());
    }

    pub fn outgoing(&self) -> &[String] {
        &self.outgoing
    }

    /// The incoming traversal order: outgoing reversed.
    pub fn incoming(&self) -> Vec<&str> {
        self.outgoing.iter().rev().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }
}
