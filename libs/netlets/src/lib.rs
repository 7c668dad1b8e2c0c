//! # netweave Protocol Composition
//!
//! Turns an ordered list of building blocks into a bidirectional pipeline:
//! the outgoing direction runs the blocks in declared order toward the
//! network-facing multiplexer, the incoming direction runs them in reverse
//! toward the application-facing connector.
//!
//! A [`Netlet`] is the assembly — configuration, resolved block instances,
//! and the two endpoints — and [`Netlet::rewire`] computes the `prev`/`next`
//! links. Blocks themselves are ordinary
//! [`MessageProcessor`](runtime::MessageProcessor)s; the ones shipped here
//! ([`FragBlock`](blocks::FragBlock), [`PadBlock`](blocks::PadBlock),
//! [`HeaderBlock`](blocks::HeaderBlock), [`CrcBlock`](blocks::CrcBlock)) are
//! the crypt-test family every deployment uses to validate a stack end to
//! end.

pub mod blocks;
pub mod chain;
pub mod netlet;

pub use chain::{ChainConfig, ChainError};
pub use netlet::{Netlet, NetletBuilder};
