//! Ordered file-name sets and the registered-file merge.

use std::collections::HashSet;

/// A set of file base names that remembers insertion order.
///
/// This is the hand-over between the upload phase and the knowledge-base phase:
/// iteration yields names in the order they were first requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNameSet {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl FileNameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a name. Returns false if it was already present (order unchanged).
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.seen.contains(&name) {
            return false;
        }
        self.seen.insert(name.clone());
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    /// Names in `self` that are not in `other`, keeping `self`'s order.
    pub fn difference(&self, other: &[String]) -> Vec<String> {
        let other: HashSet<&str> = other.iter().map(String::as_str).collect();
        self.names
            .iter()
            .filter(|name| !other.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for FileNameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = FileNameSet::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

impl IntoIterator for FileNameSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.into_iter()
    }
}

/// Result of merging requested names into a data source's registered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListMerge {
    /// Requested names that were not registered yet, in request order.
    pub new_files: Vec<String>,
    /// The old list followed by `new_files`.
    pub all_files: Vec<String>,
}

impl FileListMerge {
    pub fn is_noop(&self) -> bool {
        self.new_files.is_empty()
    }
}

/// Append the requested names missing from `old_files`.
///
/// Old entries keep their position (and are never deduplicated or reordered);
/// new entries follow in request order.
pub fn merge_file_lists(old_files: &[String], requested: &FileNameSet) -> FileListMerge {
    let new_files = requested.difference(old_files);
    let all_files = old_files
        .iter()
        .cloned()
        .chain(new_files.iter().cloned())
        .collect();
    FileListMerge {
        new_files,
        all_files,
    }
}
