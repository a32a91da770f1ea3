//! Context preparation: neighbor expansion and budgeted formatting.

pub mod expander;
pub mod format;

pub use expander::{ContextExpander, ExpansionOutcome, ExpansionStats};
pub use format::{
    ContextBudget, ContextStats, FormattedContext, PART_SEPARATOR, SourceInfo, collect_sources,
    format_context, smart_truncate,
};
