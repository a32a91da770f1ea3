//! Alias resolution: user-facing title shorthands and quoted phrases to document ids.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};
use crate::retrieval::storage::resolver_tables::AliasSource;

/// Priority assigned to matches from the fixed quotation table.
pub const QUOTATION_PRIORITY: i32 = 200;

/// Famous lines that identify their source text on sight.
struct Quotation {
    document_id: &'static str,
    title: &'static str,
    phrases: &'static [&'static str],
}

const QUOTATIONS: &[Quotation] = &[
    Quotation {
        document_id: "T08n0251",
        title: "般若波罗蜜多心经",
        phrases: &[
            "色即是空",
            "空即是色",
            "色不异空",
            "空不异色",
            "五蕴皆空",
            "照见五蕴皆空",
            "度一切苦厄",
            "揭谛揭谛",
        ],
    },
    Quotation {
        document_id: "T08n0235",
        title: "金刚般若波罗蜜经",
        phrases: &[
            "应无所住而生其心",
            "应无所住",
            "一切有为法",
            "如梦幻泡影",
            "如露亦如电",
            "无我相无人相",
            "凡所有相皆是虚妄",
        ],
    },
    Quotation {
        document_id: "T09n0262",
        title: "妙法莲华经",
        phrases: &["开权显实", "会三归一", "火宅三车"],
    },
    Quotation {
        document_id: "T19n0945",
        title: "大佛顶如来密因修证了义诸菩萨万行首楞严经",
        phrases: &["七处征心", "八还辨见"],
    },
    Quotation {
        document_id: "T14n0475",
        title: "维摩诘所说经",
        phrases: &["不二法门", "默然无言"],
    },
    Quotation {
        document_id: "T48n2008",
        title: "六祖大师法宝坛经",
        phrases: &["本来无一物", "菩提本无树", "何处惹尘埃"],
    },
];

/// A surface string mapped to a canonical document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasMapping {
    /// Surface string as it appears in questions.
    pub alias: String,
    /// Canonical document title.
    pub canonical_title: String,
    /// Canonical document identifier.
    pub document_id: String,
    /// Higher wins when the same alias is listed twice.
    pub priority: i32,
}

/// Alias cache, in load order.
struct AliasIndex {
    mappings: Vec<AliasMapping>,
    by_alias: HashMap<String, usize>,
}

impl AliasIndex {
    fn build(mut rows: Vec<AliasMapping>) -> Self {
        rows.sort_by_key(|row| Reverse(row.priority));

        let mut mappings: Vec<AliasMapping> = Vec::with_capacity(rows.len());
        let mut by_alias = HashMap::with_capacity(rows.len());
        for row in rows {
            if by_alias.contains_key(&row.alias) {
                continue;
            }
            by_alias.insert(row.alias.clone(), mappings.len());
            mappings.push(row);
        }

        Self { mappings, by_alias }
    }

    fn get(&self, alias: &str) -> Option<&AliasMapping> {
        self.by_alias.get(alias).map(|idx| &self.mappings[*idx])
    }
}

/// Resolves aliases against a cache populated once from an [`AliasSource`].
pub struct AliasResolver {
    source: Arc<dyn AliasSource>,
    cache: OnceCell<AliasIndex>,
}

impl AliasResolver {
    /// Create a resolver over `source`; nothing is loaded until [`AliasResolver::init`].
    #[must_use]
    pub fn new(source: Arc<dyn AliasSource>) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    /// Populate the cache. Concurrent first callers share a single scan.
    ///
    /// # Errors
    /// Returns the source error; the resolver stays uninitialized and a later call retries.
    pub async fn init(&self) -> RetrievalResult<()> {
        self.cache
            .get_or_try_init(|| async {
                let rows = self.source.load_aliases().await?;
                let index = AliasIndex::build(rows);
                info!(aliases = index.mappings.len(), "alias cache loaded");
                Ok::<_, RetrievalError>(index)
            })
            .await?;
        Ok(())
    }

    /// Whether the cache is populated.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cache.initialized()
    }

    /// Number of cached aliases (zero before init).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.get().map_or(0, |index| index.mappings.len())
    }

    /// Whether no alias is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self) -> Option<&AliasIndex> {
        let index = self.cache.get();
        if index.is_none() {
            warn!("{}", RetrievalError::ResolverNotReady("alias"));
        }
        index
    }

    /// Every alias contained in `query`, plus quotation matches for documents
    /// not already matched, sorted by priority descending.
    #[must_use]
    pub fn extract_aliases(&self, query: &str) -> Vec<AliasMapping> {
        let Some(index) = self.index() else {
            return Vec::new();
        };

        let mut matches: Vec<AliasMapping> = index
            .mappings
            .iter()
            .filter(|mapping| query.contains(mapping.alias.as_str()))
            .cloned()
            .collect();

        for quotation in QUOTATIONS {
            for phrase in quotation.phrases {
                if !query.contains(phrase) {
                    continue;
                }
                if matches
                    .iter()
                    .any(|existing| existing.document_id == quotation.document_id)
                {
                    continue;
                }
                matches.push(AliasMapping {
                    alias: (*phrase).to_string(),
                    canonical_title: quotation.title.to_string(),
                    document_id: quotation.document_id.to_string(),
                    priority: QUOTATION_PRIORITY,
                });
            }
        }

        matches.sort_by_key(|mapping| Reverse(mapping.priority));
        if !matches.is_empty() {
            debug!(count = matches.len(), "aliases matched");
        }
        matches
    }

    /// Unique target document ids of `query`, by first occurrence.
    #[must_use]
    pub fn document_ids(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.extract_aliases(query)
            .into_iter()
            .filter_map(|mapping| {
                seen.insert(mapping.document_id.clone())
                    .then_some(mapping.document_id)
            })
            .collect()
    }

    /// Whether `document_id` is one of the targets of `query`.
    #[must_use]
    pub fn is_relevant_document(&self, query: &str, document_id: &str) -> bool {
        self.extract_aliases(query)
            .iter()
            .any(|mapping| mapping.document_id == document_id)
    }

    /// Canonical title for an exact alias.
    #[must_use]
    pub fn canonical_title(&self, alias: &str) -> Option<String> {
        self.index()?
            .get(alias)
            .map(|mapping| mapping.canonical_title.clone())
    }

    /// Document id for an exact alias.
    #[must_use]
    pub fn document_id(&self, alias: &str) -> Option<String> {
        self.index()?
            .get(alias)
            .map(|mapping| mapping.document_id.clone())
    }
}
