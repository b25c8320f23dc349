//! Read-only views over cleaned incident records.
//!
//! Query operations take any [`IncidentView`]. A view yields records and
//! decides how a grouping key reads on each one, which lets
//! [`OverflowView`] relabel a single field without touching the records
//! underneath.

use std::collections::BTreeSet;

use crime_stats_incident_models::{GroupKey, GroupValue, Incident};

/// A read-only collection of incidents with per-key value lookup.
pub trait IncidentView {
    /// Iterates the records in the view.
    fn incidents(&self) -> Box<dyn Iterator<Item = &Incident> + '_>;

    /// Number of records in the view.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of `key` on `incident` as seen through this view.
    fn value_of(&self, incident: &Incident, key: GroupKey) -> GroupValue {
        key.value_of(incident)
    }
}

impl IncidentView for [Incident] {
    fn incidents(&self) -> Box<dyn Iterator<Item = &Incident> + '_> {
        Box::new(self.iter())
    }

    fn len(&self) -> usize {
        <[Incident]>::len(self)
    }
}

/// Borrowed records selected from a larger collection, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subset<'a> {
    records: Vec<&'a Incident>,
}

impl<'a> Subset<'a> {
    /// Every record of `incidents`.
    #[must_use]
    pub fn all(incidents: &'a [Incident]) -> Self {
        Self {
            records: incidents.iter().collect(),
        }
    }

    #[must_use]
    pub const fn from_refs(records: Vec<&'a Incident>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn records(&self) -> &[&'a Incident] {
        &self.records
    }
}

impl<'a> FromIterator<&'a Incident> for Subset<'a> {
    fn from_iter<I: IntoIterator<Item = &'a Incident>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IncidentView for Subset<'_> {
    fn incidents(&self) -> Box<dyn Iterator<Item = &Incident> + '_> {
        Box::new(self.records.iter().map(|r| &**r))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// A view that relabels every value of one key outside a kept set.
///
/// Built by [`crate::query::top_n_with_overflow`]. Records and all other
/// keys read through to the base view unchanged.
#[derive(Debug, Clone)]
pub struct OverflowView<'v, V: IncidentView + ?Sized> {
    base: &'v V,
    key: GroupKey,
    kept: BTreeSet<GroupValue>,
    label: String,
}

impl<'v, V: IncidentView + ?Sized> OverflowView<'v, V> {
    #[must_use]
    pub const fn new(
        base: &'v V,
        key: GroupKey,
        kept: BTreeSet<GroupValue>,
        label: String,
    ) -> Self {
        Self {
            base,
            key,
            kept,
            label,
        }
    }

    /// The relabeled key.
    #[must_use]
    pub const fn key(&self) -> GroupKey {
        self.key
    }

    /// Values that keep their own label.
    #[must_use]
    pub const fn kept(&self) -> &BTreeSet<GroupValue> {
        &self.kept
    }

    /// The value every other value is mapped to.
    #[must_use]
    pub fn overflow_value(&self) -> GroupValue {
        GroupValue::Text(self.label.clone())
    }

    #[must_use]
    pub const fn base(&self) -> &'v V {
        self.base
    }
}

impl<V: IncidentView + ?Sized> IncidentView for OverflowView<'_, V> {
    fn incidents(&self) -> Box<dyn Iterator<Item = &Incident> + '_> {
        self.base.incidents()
    }

    fn len(&self) -> usize {
        self.base.len()
    }

    fn value_of(&self, incident: &Incident, key: GroupKey) -> GroupValue {
        let value = self.base.value_of(incident, key);
        if key == self.key && !self.kept.contains(&value) {
            self.overflow_value()
        } else {
            value
        }
    }
}
