use super::filter::ClassFilter;
use crate::{common::*, error::LeafError};

/// The ordered set of class labels.
///
/// The index of a class is its position in lexicographic order, so the
/// catalog of an unchanged directory tree is always the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassCatalog {
    classes: IndexSet<String>,
}

impl ClassCatalog {
    /// Scans the immediate subdirectories of `root` and keeps the ones
    /// accepted by the filter.
    pub fn discover(root: impl AsRef<Path>, filter: &dyn ClassFilter) -> Result<Self, LeafError> {
        let root = root.as_ref();
        let mut names = vec![];

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!("ignore non UTF-8 directory name {:?}", name);
                    continue;
                }
            };
            if filter.matches(&name) {
                names.push(name);
            }
        }

        Self::from_names(names).map_err(|_| LeafError::ClassNotFound {
            dir: root.to_owned(),
        })
    }

    /// Builds a catalog from a list of class names, sorting and deduplicating them.
    pub fn from_names<S>(names: impl IntoIterator<Item = S>) -> Result<Self>
    where
        S: Into<String>,
    {
        let classes: IndexSet<String> = names
            .into_iter()
            .map(Into::into)
            .sorted()
            .dedup()
            .collect();
        ensure!(!classes.is_empty(), "the class catalog must not be empty");
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.classes.get_index_of(name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.classes.get_index(index).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.classes.iter().map(String::as_str)
    }

    /// Writes the catalog to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write class catalog '{}'", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read class catalog '{}'", path.display()))?;
        let catalog = serde_json::from_str(&text)?;
        Ok(catalog)
    }
}

impl TryFrom<Vec<String>> for ClassCatalog {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_names(names)
    }
}

impl From<ClassCatalog> for Vec<String> {
    fn from(catalog: ClassCatalog) -> Self {
        catalog.classes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AcceptAll, KeywordFilter};

    #[test]
    fn discover_sorts_and_filters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["apple_scab", "apple_black_rot", "grape_rot", "apple_healthy"] {
            fs::create_dir(dir.path().join(name))?;
        }
        fs::write(dir.path().join("apple_notes.txt"), "not a class")?;

        let catalog = ClassCatalog::discover(dir.path(), &KeywordFilter::default())?;
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, ["apple_black_rot", "apple_healthy", "apple_scab"]);
        assert_eq!(catalog.index_of("apple_scab"), Some(2));
        assert_eq!(catalog.name(0), Some("apple_black_rot"));

        let again = ClassCatalog::discover(dir.path(), &KeywordFilter::default())?;
        assert_eq!(catalog, again);

        let all = ClassCatalog::discover(dir.path(), &AcceptAll)?;
        assert_eq!(all.len(), 4);
        Ok(())
    }

    #[test]
    fn discover_without_match_fails() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("grape_rot"))?;

        let result = ClassCatalog::discover(dir.path(), &KeywordFilter::default());
        assert!(matches!(result, Err(LeafError::ClassNotFound { .. })));
        Ok(())
    }

    #[test]
    fn catalog_json_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("classes.json");
        let catalog = ClassCatalog::from_names(["b", "a", "b"])?;
        assert_eq!(catalog.len(), 2);

        catalog.save(&path)?;
        assert_eq!(ClassCatalog::load(&path)?, catalog);
        assert!(serde_json::from_str::<ClassCatalog>("[]").is_err());
        Ok(())
    }
}
