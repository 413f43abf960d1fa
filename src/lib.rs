//! Reach: audience segmentation for a small CRM.
//!
//! Marketers describe an audience as a tree of conditions over customer
//! attributes joined by AND/OR groups. The workspace is split into:
//!
//! * [`reach_core`]: configuration, errors, logging and the database pool
//! * [`reach_rules`]: the rule tree, its builder, translation and evaluation
//! * [`reach_synth`]: natural-language rule synthesis and message suggestions
//! * [`reach_gateway`]: the HTTP API and persistence
//!
//! The `reach` command-line client lives in the `reach-cli` crate.

pub use reach_core;
pub use reach_gateway;
pub use reach_rules;
pub use reach_synth;

pub use reach_gateway::{start_gateway, start_gateway_with_state, GatewayHandle};
pub use reach_rules::{
    translate, translate_with_report, AudienceEvaluator, BackendQuery, RuleBuilder, RuleGroup,
    TranslationMode,
};
pub use reach_synth::RuleSynthesizer;
