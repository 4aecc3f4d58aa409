// Core automod module - contains the rule evaluation engine.
// Following the same pattern as the other core modules: models, ports and
// services, no Discord types.

pub mod action_resolver;
pub mod automod_models;
pub mod automod_service;
pub mod enforcement;
pub mod feature_extractor;
pub mod rule_aggregator;
pub mod rule_config;

pub use action_resolver::*;
pub use automod_models::*;
pub use automod_service::*;
pub use enforcement::*;
pub use feature_extractor::*;
pub use rule_aggregator::*;
pub use rule_config::*;
