//! Form schema model for the Formrun runtime.
//!
//! These types are the declarative description a published form carries:
//! pages of blocks (questions), display settings, a theme, and an ordered
//! list of conditional-logic rules. The runtime engine consumes this model;
//! the builder product produces it as JSON.
//!
//! Parsing is deliberately permissive: unknown block types, operators, and
//! action types deserialize into inert `Other` variants so that one
//! forward-version rule cannot break an already-deployed form.

pub mod block;
pub mod form;
pub mod logic;
pub mod value;

pub use block::{Block, BlockType, ValidationRule};
pub use form::{FormSchema, FormSettings, Page, SchemaIssue, Theme};
pub use logic::{ActionType, ConditionOp, LogicAction, LogicCondition, LogicRule};
pub use value::FieldValue;
