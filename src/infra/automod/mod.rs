// Implementations for the automod engine ports.

pub mod in_memory_window_store;
pub mod json_rule_store;

// Re-export for convenience
pub use in_memory_window_store::InMemoryWindowStore;
pub use json_rule_store::JsonRuleStore;
