#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub is_crisis: bool,
    pub matched_keyword: Option<String>,
}

impl SafetyVerdict {
    fn clear() -> Self {
        Self { is_crisis: false, matched_keyword: None }
    }
}

/// Case-insensitive substring match against the configured crisis keywords.
/// A best-effort heuristic: anything outside the list is not detected.
#[derive(Clone, Debug)]
pub struct SafetyClassifier {
    keywords: Vec<String>,
}

impl SafetyClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn classify(&self, text: &str) -> SafetyVerdict {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| haystack.contains(keyword.as_str()))
            .map(|keyword| SafetyVerdict {
                is_crisis: true,
                matched_keyword: Some(keyword.clone()),
            })
            .unwrap_or_else(SafetyVerdict::clear)
    }
}
