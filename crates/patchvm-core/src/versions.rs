use std::slice;

use crate::ordering;

/// Version ids published by the remote, ascending and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet {
    versions: Vec<String>,
}

impl VersionSet {
    /// The greatest published version.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.versions.last().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        self.versions.iter().any(|candidate| candidate == version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(String::as_str)
    }
}

impl FromIterator<String> for VersionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut versions: Vec<String> = iter.into_iter().collect();
        versions.sort_by(|left, right| ordering::compare(left, right).then_with(|| left.cmp(right)));
        versions.dedup();
        Self { versions }
    }
}

impl<'a> IntoIterator for &'a VersionSet {
    type Item = &'a String;
    type IntoIter = slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.iter()
    }
}
