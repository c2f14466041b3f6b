//! Engine configuration.

/// Sizing parameters for one [`crate::ExchangeManager`].
///
/// Both pools are fixed-capacity: exhaustion is reported loudly as an error
/// rather than silently growing, matching the memory-predictability contract
/// of the embedded targets this stack runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum simultaneously open exchange contexts.
    pub exchange_pool_capacity: usize,
    /// Maximum registered unsolicited-message handlers.
    pub handler_table_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exchange_pool_capacity: 16,
            handler_table_capacity: 8,
        }
    }
}
