//! Query-side resolvers: document aliases and term synonyms.

pub mod alias;
pub mod synonym;

pub use alias::{AliasMapping, AliasResolver};
pub use synonym::{
    ExpandedQuery, QueryProvenance, RelationType, SynonymMapping, SynonymResolver, SynonymStats,
};
