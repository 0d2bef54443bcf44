//! Outcome of an editing operation (merge, paste, ...) on one element: the element itself, the
//! problems encountered and tags that still have to be applied to it.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    data::osm::{ElementKey, ElementRef, OsmElement, Tags},
    storage::Storage,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Issue {
    DuplicateNode,
    TagConflict,
    RoleConflict,
    MergedTags,
    NotReversible,
    SameObject,
    OutsideDownloadedArea,
    DanglingReference,
}

impl Issue {
    pub fn description(&self) -> &'static str {
        match self {
            Issue::DuplicateNode => "duplicate node",
            Issue::TagConflict => "tag conflict",
            Issue::RoleConflict => "role conflict",
            Issue::MergedTags => "merged tags",
            Issue::NotReversible => "not reversible",
            Issue::SameObject => "same object",
            Issue::OutsideDownloadedArea => "outside of downloaded area",
            Issue::DanglingReference => "references missing elements",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Result borrowing its element from a [`Storage`]. Use [`EditResult::detach`] before the
/// storage is mutated or rebuilt.
#[derive(Debug, Clone, Default)]
pub struct EditResult<'a> {
    element: Option<ElementRef<'a>>,
    issues: BTreeSet<Issue>,
    tags: Option<Tags>,
}

impl<'a> EditResult<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        EditResult {
            element: Some(element),
            ..Self::default()
        }
    }

    pub fn element(&self) -> Option<ElementRef<'a>> {
        self.element
    }

    pub fn add_issue(&mut self, issue: Issue) {
        self.issues.insert(issue);
    }

    pub fn add_issues<I: IntoIterator<Item = Issue>>(&mut self, issues: I) {
        self.issues.extend(issues);
    }

    pub fn has_issue(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn issues(&self) -> &BTreeSet<Issue> {
        &self.issues
    }

    pub fn tags(&self) -> Option<&Tags> {
        self.tags.as_ref()
    }

    /// The first mapping is taken as is, later ones are merged in and win on equal keys.
    pub fn add_tags(&mut self, tags: Tags) {
        match &mut self.tags {
            Some(current) => current.extend(tags),
            None => self.tags = Some(tags),
        }
    }

    /// Drop the borrow, keeping only the element key.
    pub fn detach(self) -> SavedResult {
        SavedResult {
            key: self.element.map(|element| element.key()),
            issues: self.issues,
            tags: self.tags,
        }
    }

    /// Element description followed by the description of each issue.
    pub fn describe(&self) -> String {
        let mut description = match self.element {
            Some(element) => element.description(),
            None => "unresolved element".to_string(),
        };
        for issue in &self.issues {
            description.push(' ');
            description.push_str(issue.description());
        }
        description
    }
}

impl fmt::Display for EditResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Detached form of an [`EditResult`], independent of any storage instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SavedResult {
    key: Option<ElementKey>,
    issues: BTreeSet<Issue>,
    tags: Option<Tags>,
}

impl SavedResult {
    pub fn key(&self) -> Option<ElementKey> {
        self.key
    }

    pub fn issues(&self) -> &BTreeSet<Issue> {
        &self.issues
    }

    /// Look the element up again. If it is gone the result comes back without an element.
    pub fn reattach(self, storage: &Storage) -> EditResult<'_> {
        EditResult {
            element: self.key.and_then(|key| storage.get(key.kind, key.id)),
            issues: self.issues,
            tags: self.tags,
        }
    }
}
