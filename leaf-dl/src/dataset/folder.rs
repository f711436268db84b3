use super::{
    catalog::ClassCatalog,
    filter::{ClassFilter, FileFilter},
};
use crate::{common::*, error::LeafError};

/// An image file and the index of its class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Samples laid out as `root/<class>/**/<file>`.
#[derive(Debug, Clone)]
pub struct FolderDataset {
    root: PathBuf,
    catalog: ClassCatalog,
    samples: Vec<Sample>,
}

impl FolderDataset {
    /// Discovers the classes under `root` and indexes their sample files.
    pub fn load(
        root: impl AsRef<Path>,
        class_filter: &dyn ClassFilter,
        file_filter: &dyn FileFilter,
    ) -> Result<Self, LeafError> {
        let root = root.as_ref();
        let catalog = ClassCatalog::discover(root, class_filter)?;
        Self::with_catalog(root, catalog, file_filter)
    }

    /// Indexes the sample files of every class in a given catalog.
    pub fn with_catalog(
        root: impl AsRef<Path>,
        catalog: ClassCatalog,
        file_filter: &dyn FileFilter,
    ) -> Result<Self, LeafError> {
        let root = root.as_ref().to_owned();
        let mut samples = vec![];

        for (label, class) in catalog.names().enumerate() {
            let class_dir = root.join(class);
            let mut files = vec![];
            collect_files(&class_dir, file_filter, &mut files)?;

            if files.is_empty() {
                return Err(LeafError::EmptyClass {
                    class: class.to_owned(),
                    dir: class_dir,
                });
            }

            files.sort();
            samples.extend(files.into_iter().map(|path| Sample { path, label }));
        }

        debug!(
            "indexed {} samples in {} classes under '{}'",
            samples.len(),
            catalog.len(),
            root.display()
        );

        Ok(Self {
            root,
            catalog,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The class index of every sample, in sample order.
    pub fn targets(&self) -> Vec<usize> {
        self.samples.iter().map(|sample| sample.label).collect()
    }
}

fn collect_files(
    dir: &Path,
    file_filter: &dyn FileFilter,
    files: &mut Vec<PathBuf>,
) -> Result<(), LeafError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .map(|entry| -> Result<_, std::io::Error> {
            let entry = entry?;
            Ok((entry.path(), entry.file_type()?))
        })
        .try_collect()?;
    entries.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

    for (path, file_type) in entries {
        if file_type.is_dir() {
            collect_files(&path, file_filter, files)?;
        } else if file_type.is_symlink() && path.is_dir() {
            // symlinked directories may form cycles
            debug!("skip symlinked directory '{}'", path.display());
        } else if path.is_file() && file_filter.is_valid(&path) {
            files.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ExtensionFilter, KeywordFilter};

    #[test]
    fn index_samples_with_nested_dirs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        fs::create_dir_all(root.join("apple_scab/nested"))?;
        fs::create_dir_all(root.join("apple_healthy"))?;
        fs::write(root.join("apple_scab/b.JPG"), b"")?;
        fs::write(root.join("apple_scab/a.png"), b"")?;
        fs::write(root.join("apple_scab/nested/c.jpg"), b"")?;
        fs::write(root.join("apple_scab/readme.txt"), b"")?;
        fs::write(root.join("apple_healthy/x.jpg"), b"")?;

        let dataset =
            FolderDataset::load(root, &KeywordFilter::default(), &ExtensionFilter::default())?;
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.targets(), vec![0, 1, 1, 1]);

        let names: Vec<_> = dataset
            .samples()
            .iter()
            .map(|sample| sample.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("apple_healthy/x.jpg"),
                PathBuf::from("apple_scab/a.png"),
                PathBuf::from("apple_scab/b.JPG"),
                PathBuf::from("apple_scab/nested/c.jpg"),
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn skip_symlinked_dirs() -> Result<()> {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir()?;
        let root = dir.path();
        fs::create_dir_all(root.join("apple_scab/nested"))?;
        fs::write(root.join("apple_scab/a.jpg"), b"")?;
        fs::write(root.join("apple_scab/nested/b.jpg"), b"")?;
        symlink(root.join("apple_scab"), root.join("apple_scab/nested/loop"))?;
        symlink(root.join("apple_scab/a.jpg"), root.join("apple_scab/linked.jpg"))?;

        let dataset =
            FolderDataset::load(root, &KeywordFilter::default(), &ExtensionFilter::default())?;
        let names: Vec<_> = dataset
            .samples()
            .iter()
            .map(|sample| sample.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("apple_scab/a.jpg"),
                PathBuf::from("apple_scab/linked.jpg"),
                PathBuf::from("apple_scab/nested/b.jpg"),
            ]
        );
        Ok(())
    }

    #[test]
    fn empty_class_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("apple_scab"))?;
        fs::create_dir_all(dir.path().join("apple_healthy"))?;
        fs::write(dir.path().join("apple_scab/a.jpg"), b"")?;
        fs::write(dir.path().join("apple_healthy/a.gif"), b"")?;

        let result = FolderDataset::load(
            dir.path(),
            &KeywordFilter::default(),
            &ExtensionFilter::default(),
        );
        match result {
            Err(LeafError::EmptyClass { class, .. }) => assert_eq!(class, "apple_healthy"),
            other => panic!("unexpected result {:?}", other),
        }
        Ok(())
    }
}
