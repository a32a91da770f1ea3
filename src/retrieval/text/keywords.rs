//! Query keyword extraction shared by lexical search and context truncation.
//!
//! Both consumers must see the same keyword set for a question: the lexical
//! retriever searches for it, and the context formatter centers truncated
//! passages on its first occurrence.

/// Fixed doctrinal phrases. When a question quotes any of them, only these
/// phrases are searched and the rest of the question is discarded.
pub const PRESERVED_PHRASES: &[&str] = &[
    "色即是空",
    "空即是色",
    "色不异空",
    "空不异色",
    "应无所住",
    "无所住而生其心",
    "一切有为法",
    "如梦幻泡影",
    "如露亦如电",
    "照见五蕴皆空",
    "度一切苦厄",
    "不生不灭",
    "不垢不净",
    "不增不减",
    "无我相",
    "无人相",
    "无众生相",
    "无寿者相",
    "涅槃寂静",
    "诸行无常",
    "诸法无我",
    "四圣谛",
    "八正道",
    "十二因缘",
    "三法印",
    "般若波罗蜜",
    "阿耨多罗三藐三菩提",
];

/// Interrogatives, particles and function words, removed in this order.
pub const STOPWORDS: &[&str] = &[
    "什么", "是什么", "怎么", "如何", "为什么", "为何", "哪些", "哪个", "的", "了", "吗", "呢",
    "吧", "啊", "呀", "哦", "嗯", "有", "在", "和", "与", "及", "或", "而", "但", "却", "就",
    "请", "问", "告诉", "解释", "说明", "介绍", "讲", "讲解", "能", "可以", "可", "会", "要",
    "想", "应该", "必须", "我", "你", "他", "她", "它", "我们", "你们", "他们", "这", "那",
    "这个", "那个", "这些", "那些", "一", "一个", "两", "几", "多", "少", "些", "意思", "含义",
    "怎么理解", "什么意思",
];

const PUNCTUATION: &[char] = &[
    '？', '?', '。', '，', ',', '！', '!', '、', '：', ':', '“', '”', '‘', '’', '"', '\'', '（',
    '）', '(', ')',
];

/// Whether `ch` is a question punctuation mark.
#[must_use]
pub fn is_punctuation(ch: char) -> bool {
    PUNCTUATION.contains(&ch)
}

/// Whether `ch` is a CJK unified ideograph (basic block).
#[must_use]
pub const fn is_han(ch: char) -> bool {
    matches!(ch, '\u{4e00}'..='\u{9fff}')
}

/// Remove question punctuation and surrounding whitespace.
#[must_use]
pub fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|ch| !is_punctuation(*ch))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Extract the search keywords of a question.
///
/// Quoted doctrinal phrases win outright. Otherwise stopwords are removed and the
/// remainder is split on whitespace and punctuation. When nothing survives, the
/// punctuation-stripped question itself is the only keyword.
#[must_use]
pub fn extract_keywords(query: &str) -> Vec<String> {
    let preserved: Vec<String> = PRESERVED_PHRASES
        .iter()
        .filter(|phrase| query.contains(**phrase))
        .map(|phrase| (*phrase).to_string())
        .collect();
    if !preserved.is_empty() {
        return preserved;
    }

    let stripped = STOPWORDS
        .iter()
        .fold(query.to_string(), |text, stopword| text.replace(stopword, ""));
    let keywords: Vec<String> = stripped
        .split(|ch: char| ch.is_whitespace() || is_punctuation(ch))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect();
    if !keywords.is_empty() {
        return keywords;
    }

    let fallback = strip_punctuation(query);
    if fallback.is_empty() {
        Vec::new()
    } else {
        vec![fallback]
    }
}

/// Join extracted keywords into the term handed to a full-text index.
#[must_use]
pub fn search_term(keywords: &[String]) -> String {
    keywords.concat()
}

/// Candidate glossary headwords: every 2 to 4 character all-Han substring of
/// the question, longest first, without duplicates.
#[must_use]
pub fn glossary_terms(query: &str) -> Vec<String> {
    let chars: Vec<char> = strip_punctuation(query).chars().collect();
    let mut terms: Vec<String> = Vec::new();

    for width in (2..=4).rev() {
        if chars.len() < width {
            continue;
        }
        for window in chars.windows(width) {
            if !window.iter().all(|ch| is_han(*ch)) {
                continue;
            }
            let term: String = window.iter().collect();
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
    }

    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserved_phrase_discards_rest_of_question() {
        let keywords = extract_keywords("请解释色即是空，空即是色的含义");
        assert_eq!(keywords, vec!["色即是空".to_string(), "空即是色".to_string()]);
    }

    #[test]
    fn test_stopwords_and_punctuation_are_removed() {
        assert_eq!(extract_keywords("如何理解阿赖耶识？"), vec!["理解阿赖耶识".to_string()]);
        assert_eq!(
            extract_keywords("唯识 与 中观"),
            vec!["唯识".to_string(), "中观".to_string()]
        );
    }

    #[test]
    fn test_removal_follows_list_order() {
        // "什么" goes before "是什么" can match, leaving the copula.
        assert_eq!(extract_keywords("什么是藏识"), vec!["是藏识".to_string()]);
    }

    #[test]
    fn test_all_stopwords_falls_back_to_question() {
        assert_eq!(extract_keywords("什么意思？"), vec!["什么意思".to_string()]);
        assert!(extract_keywords("？？").is_empty());
        assert!(extract_keywords("").is_empty());
    }

    #[test]
    fn test_search_term_concatenates() {
        let keywords = vec!["末那识".to_string(), "阿赖耶识".to_string()];
        assert_eq!(search_term(&keywords), "末那识阿赖耶识");
    }

    #[test]
    fn test_glossary_terms_longest_first() {
        let terms = glossary_terms("般若智慧");
        assert_eq!(terms[0], "般若智慧");
        assert_eq!(&terms[1..3], &["般若智".to_string(), "若智慧".to_string()]);
        assert_eq!(terms.len(), 1 + 2 + 3);
    }

    #[test]
    fn test_glossary_terms_skip_non_han_windows() {
        let terms = glossary_terms("what is 涅槃?");
        assert_eq!(terms, vec!["涅槃".to_string()]);
        assert!(glossary_terms("空").is_empty());
    }

    #[test]
    fn test_is_han_bounds() {
        assert!(is_han('一'));
        assert!(is_han('龥'));
        assert!(!is_han('a'));
        assert!(!is_han('。'));
    }
}
