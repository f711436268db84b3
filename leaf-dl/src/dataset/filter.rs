//! Predicates selecting class directories and sample files.

use crate::{common::*, error::LeafError};

/// Decides whether a directory name under the dataset root is a class.
pub trait ClassFilter: Debug + Send + Sync {
    fn matches(&self, class_name: &str) -> bool;
}

/// Accepts directory names containing a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordFilter {
    keyword: String,
}

impl KeywordFilter {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }
}

impl Default for KeywordFilter {
    fn default() -> Self {
        Self::new("apple")
    }
}

impl ClassFilter for KeywordFilter {
    fn matches(&self, class_name: &str) -> bool {
        class_name.contains(&self.keyword)
    }
}

/// Accepts directory names where the pattern matches anywhere in the name.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    regex: Regex,
}

impl RegexFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl ClassFilter for RegexFilter {
    fn matches(&self, class_name: &str) -> bool {
        self.regex.is_match(class_name)
    }
}

/// Accepts only the listed directory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowListFilter {
    classes: HashSet<String>,
}

impl AllowListFilter {
    pub fn new<S>(classes: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }
}

impl ClassFilter for AllowListFilter {
    fn matches(&self, class_name: &str) -> bool {
        self.classes.contains(class_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptAll;

impl ClassFilter for AcceptAll {
    fn matches(&self, _class_name: &str) -> bool {
        true
    }
}

/// Adapts a closure into a [ClassFilter].
pub struct FnFilter<F>(pub F);

impl<F> Debug for FnFilter<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnFilter").finish()
    }
}

impl<F> ClassFilter for FnFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, class_name: &str) -> bool {
        (self.0)(class_name)
    }
}

/// Decides whether a file is a usable sample.
pub trait FileFilter: Debug + Send + Sync {
    fn is_valid(&self, path: &Path) -> bool;
}

/// Case-insensitive file extension allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Creates a filter from extensions, with or without the leading dot.
    pub fn new<S>(extensions: impl IntoIterator<Item = S>) -> Self
    where
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .unique()
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn accepts_name(&self, file_name: &str) -> bool {
        let file_name = file_name.to_lowercase();
        self.extensions.iter().any(|ext| {
            file_name
                .strip_suffix(ext.as_str())
                .map(|stem| stem.ends_with('.'))
                .unwrap_or(false)
        })
    }

    /// Rejects the file name with [LeafError::UnsupportedExtension] unless accepted.
    pub fn check_name(&self, file_name: &str) -> Result<(), LeafError> {
        if self.accepts_name(file_name) {
            Ok(())
        } else {
            Err(LeafError::UnsupportedExtension {
                file_name: file_name.to_owned(),
                expected: self.extensions.clone(),
            })
        }
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(["jpg", "png"])
    }
}

impl FileFilter for ExtensionFilter {
    fn is_valid(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.accepts_name(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_is_case_insensitive() {
        let filter = ExtensionFilter::default();
        assert!(filter.accepts_name("leaf.jpg"));
        assert!(filter.accepts_name("LEAF.JPG"));
        assert!(filter.accepts_name("image.Png"));
        assert!(!filter.accepts_name("leaf.gif"));
        assert!(!filter.accepts_name("leaf.jpeg"));
        assert!(!filter.accepts_name("jpg"));
        assert!(!filter.accepts_name("notajpg"));
        assert!(filter.is_valid(Path::new("/data/apple_scab/0001.JPG")));
    }

    #[test]
    fn extension_filter_reports_unsupported() {
        let filter = ExtensionFilter::new([".jpg", "PNG"]);
        assert_eq!(filter.extensions(), &["jpg".to_string(), "png".to_string()]);
        match filter.check_name("leaf.gif") {
            Err(LeafError::UnsupportedExtension { file_name, .. }) => {
                assert_eq!(file_name, "leaf.gif")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn class_filters() -> Result<()> {
        assert!(KeywordFilter::default().matches("apple_scab"));
        assert!(!KeywordFilter::default().matches("grape_rot"));
        assert!(RegexFilter::new("^(apple|pear)_")?.matches("pear_rust"));
        assert!(!RegexFilter::new("^apple_")?.matches("crab_apple_x"));
        assert!(AllowListFilter::new(["apple_healthy"]).matches("apple_healthy"));
        assert!(!AllowListFilter::new(["apple_healthy"]).matches("apple_scab"));
        assert!(AcceptAll.matches("anything"));
        assert!(FnFilter(|name: &str| name.len() > 3).matches("corn"));
        Ok(())
    }
}
