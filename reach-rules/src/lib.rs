//! Rule-group segmentation for the Reach CRM.
//!
//! A segment is described by a recursive tree of field/operator/value
//! conditions joined by AND/OR groups. This crate holds that model, the
//! copy-on-write edits and interactive builder used to shape it, the
//! translation into the group/condition query the evaluator understands,
//! and the evaluator that turns a query into an audience estimate.

mod builder;
mod condition;
mod error;
mod evaluator;
mod group;
mod loader;
pub mod mutate;
mod preview;
mod query;
mod schema;
mod translator;

pub use builder::{Mutation, NodeIdGenerator, RuleBuilder};
pub use condition::{Condition, ConditionUpdate, Field, Operator};
pub use error::RuleError;
pub use evaluator::{
    matches_condition, AudienceEstimate, AudienceEvaluator, CustomerProfile, DEFAULT_SAMPLE_SIZE,
};
pub use group::{Combinator, RuleGroup, RuleNode, ROOT_ID};
pub use loader::{load_document, load_documents, load_tree, parse_document, RuleDocument};
pub use preview::{
    AudienceEstimator, InMemoryAudience, LivePreview, PreviewSnapshot, PreviewTicket,
    PreviewTracker, ScheduledPreview,
};
pub use query::{
    parse_query, BackendQuery, QueryCondition, QueryField, QueryGroup, QueryOperator, QueryValue,
};
pub use schema::{ModelSchema, SchemaViolation, SchemaViolations, SynthesisSchema};
pub use translator::{
    coerce_value, from_backend_query, to_backend_query, translate, translate_with_report,
    Translation, TranslationMode, MAX_QUERY_GROUPS,
};
