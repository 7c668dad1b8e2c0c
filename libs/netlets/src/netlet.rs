//! Netlet assembly
//!
//! A netlet is a complete protocol stack: an id URI, a chain configuration,
//! the resolved building-block instances, and the two endpoints — the
//! application-facing connector and the network-facing multiplexer.
//!
//! [`Netlet::rewire`] links the pipeline so that following `next` from the
//! connector visits the blocks in declared order and ends at the
//! multiplexer, and following `prev` from the multiplexer visits them in
//! reverse and ends at the connector. Rewiring is idempotent and may be
//! repeated after the block set changes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::chain::{ChainConfig, ChainError};
use runtime::{MessageProcessor, MessageScheduler, SchedulerError};

pub struct Netlet {
    id: String,
    config: ChainConfig,
    blocks: HashMap<String, Arc<dyn MessageProcessor>>,
    connector: Arc<dyn MessageProcessor>,
    multiplexer: Arc<dyn MessageProcessor>,
}

impl Netlet {
    pub fn builder(id: impl Into<String>) -> NetletBuilder {
        NetletBuilder {
            id: id.into(),
            blocks: Vec::new(),
            connector: None,
            multiplexer: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn block(&self, name: &str) -> Option<&Arc<dyn MessageProcessor>> {
        self.blocks.get(name)
    }

    fn resolve(&self, name: &str) -> Result<&Arc<dyn MessageProcessor>, ChainError> {
        self.blocks.get(name).ok_or_else(|| ChainError::UnknownBlock {
            name: name.to_owned(),
        })
    }

    /// (Re)computes the `prev`/`next` links across the whole pipeline.
    pub fn rewire(&self) -> Result<(), ChainError> {
        let order = self.config.outgoing();
        if order.is_empty() {
            return Err(ChainError::EmptyChain);
        }

        // outgoing direction: connector -> blocks in declared order -> mux
        let mut upstream: &Arc<dyn MessageProcessor> = &self.connector;
        for name in order {
            let block = self.resolve(name)?;
            upstream.base().set_next(Some(block.id()));
            block.base().set_prev(Some(upstream.id()));
            upstream = block;
        }
        upstream.base().set_next(Some(self.multiplexer.id()));
        self.multiplexer.base().set_prev(Some(upstream.id()));

        debug!(
            netlet = %self.id,
            blocks = order.len(),
            "pipeline rewired"
        );
        Ok(())
    }

    /// Registers every building block with `scheduler`. Endpoints are
    /// registered by whoever owns them; they frequently predate the netlet.
    pub fn register_blocks(
        &self,
        scheduler: &Arc<dyn MessageScheduler>,
    ) -> Result<(), SchedulerError> {
        for name in self.config.outgoing() {
            if let Some(block) = self.blocks.get(name) {
                scheduler.register_message_processor(block.clone())?;
            }
        }
        Ok(())
    }

    /// Unregisters every building block, e.g. when tearing the stack down.
    pub fn unregister_blocks(
        &self,
        scheduler: &Arc<dyn MessageScheduler>,
    ) -> Result<(), SchedulerError> {
        for name in self.config.outgoing() {
            if let Some(block) = self.blocks.get(name) {
                scheduler.unregister_message_processor(block.id())?;
            }
        }
        Ok(())
    }
}

pub struct NetletBuilder {
    id: String,
    blocks: Vec<(String, Arc<dyn MessageProcessor>)>,
    connector: Option<Arc<dyn MessageProcessor>>,
    multiplexer: Option<Arc<dyn MessageProcessor>>,
}

impl NetletBuilder {
    /// Adds a block at the network end of the outgoing direction.
    pub fn block(mut self, name: impl Into<String>, processor: Arc<dyn MessageProcessor>) -> Self {
        self.blocks.push((name.into(), processor));
        self
    }

    pub fn connector(mut self, connector: Arc<dyn MessageProcessor>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn multiplexer(mut self, multiplexer: Arc<dyn MessageProcessor>) -> Self {
        self.multiplexer = Some(multiplexer);
        self
    }

    pub fn build(self) -> Result<Netlet, ChainError> {
        if self.blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        let connector = self.connector.ok_or(ChainError::MissingEndpoint {
            endpoint: "connector",
        })?;
        let multiplexer = self.multiplexer.ok_or(ChainError::MissingEndpoint {
            endpoint: "multiplexer",
        })?;

        let mut config = ChainConfig::default();
        let mut blocks = HashMap::new();
        for (name, processor) in self.blocks {
            config.push_back(name.clone());
            blocks.insert(name, processor);
        }

        Ok(Netlet {
            id: self.id,
            config,
            blocks,
            connector,
            multiplexer,
        })
    }
}
