//! Label vocabulary
//!
//! The custom classifier predicts one of [`KNN_LABELS`]. "Non-alcoholic" is an
//! explicit class so that a false negative surfaces as a prediction rather than
//! as a gap in the vocabulary.
//!
//! The pretrained classifier speaks ImageNet class names ("wine bottle",
//! "beer glass", ...). Those are matched against [`IMAGENET_ALCOHOL_KEYWORDS`].

/// Sentinel label the custom classifier emits for non-alcoholic drinks
pub const NON_ALCOHOLIC_LABEL: &str = "Non-alcoholic";

/// Label pre-selected when labeling a new training example
pub const DEFAULT_LABEL: &str = "Whisky";

/// Labels available to the custom classifier, in display order
pub const KNN_LABELS: &[&str] = &[
    "Whisky",
    "Red Wine",
    "White Wine",
    "Beer",
    "Sake",
    "Vodka",
    "Rum",
    "Champagne",
    "Gin",
    "Tequila",
    NON_ALCOHOLIC_LABEL,
];

/// Substrings identifying alcohol-related ImageNet class names (lowercase)
pub const IMAGENET_ALCOHOL_KEYWORDS: &[&str] = &[
    "wine", "beer", "whiskey", "cocktail", "sake", "vodka", "rum", "champagne", "gin", "tequila",
    "liquor", "malt", "lager", "stout",
];

/// Whether `label` is one of the custom classifier's labels (exact match)
pub fn is_knn_label(label: &str) -> bool {
    KNN_LABELS.contains(&label)
}

/// Whether `label` contains any of `keywords`, ignoring case
///
/// Keywords are expected in lowercase.
pub fn contains_keyword<S: AsRef<str>>(label: &str, keywords: &[S]) -> bool {
    let lower = label.to_lowercase();
    keywords.iter().any(|kw| lower.contains(kw.as_ref()))
}

/// Default keyword list as owned strings, for configuration structs
pub fn default_alcohol_keywords() -> Vec<String> {
    IMAGENET_ALCOHOL_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_in_vocabulary() {
        assert!(is_knn_label(NON_ALCOHOLIC_LABEL));
        assert!(is_knn_label(DEFAULT_LABEL));
        assert!(!is_knn_label("whisky")); // exact match only
    }

    #[test]
    fn test_keyword_match_is_case_insensitive_substring() {
        assert!(contains_keyword("Red WINE glass", IMAGENET_ALCOHOL_KEYWORDS));
        assert!(contains_keyword("beer_bottle", IMAGENET_ALCOHOL_KEYWORDS));
        assert!(!contains_keyword("water bottle", IMAGENET_ALCOHOL_KEYWORDS));
        assert!(!contains_keyword("", IMAGENET_ALCOHOL_KEYWORDS));
    }

    #[test]
    fn test_keyword_substring_matches_inside_words() {
        // "gin" is a plain substring match, so "ginger ale" matches as well
        assert!(contains_keyword("ginger ale", IMAGENET_ALCOHOL_KEYWORDS));
    }
}
