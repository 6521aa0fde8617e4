//! Difference classification over a merged schema
//!
//! Pure queries used for reporting and for deciding which sync directions
//! make sense for a given comparison.

use serde::Serialize;

use crate::schema::merge::{MergedDatabase, MergedField, MergedTable};
use crate::schema::plan::Direction;

/// Counts of differing entities, grouped by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DifferenceSummary {
    pub tables_authoritative_only: usize,
    pub tables_physical_only: usize,
    pub fields_authoritative_only: usize,
    pub fields_physical_only: usize,
    pub fields_altered: usize,
}

impl DifferenceSummary {
    pub fn total(&self) -> usize {
        self.tables_authoritative_only
            + self.tables_physical_only
            + self.fields_authoritative_only
            + self.fields_physical_only
            + self.fields_altered
    }

    /// Entities that exist only on the physical side
    pub fn physical_only(&self) -> usize {
        self.tables_physical_only + self.fields_physical_only
    }
}

impl MergedDatabase {
    /// Fields of tables present on both sides
    fn compared_fields(&self) -> impl Iterator<Item = &MergedField> {
        self.tables
            .iter()
            .filter(|t| t.same_in_both())
            .flat_map(|t| t.fields.iter())
    }

    /// Number of differing tables plus differing fields of shared tables.
    ///
    /// With `deletes_only`, only entities that exist solely on the physical
    /// side are counted: what copying the models over with deletes would remove.
    pub fn difference_count(&self, deletes_only: bool) -> usize {
        let table_diffs = self
            .tables
            .iter()
            .filter(|t| {
                if deletes_only {
                    t.physical_only()
                } else {
                    t.differs()
                }
            })
            .count();

        let field_diffs = self
            .compared_fields()
            .filter(|f| {
                if deletes_only {
                    f.physical_only()
                } else {
                    f.differs()
                }
            })
            .count();

        table_diffs + field_diffs
    }

    pub fn has_differences(&self) -> bool {
        self.difference_count(false) > 0
    }

    /// Differences grouped by kind; `total()` equals `difference_count(false)`
    pub fn summary(&self) -> DifferenceSummary {
        let mut summary = DifferenceSummary::default();

        for table in &self.tables {
            if table.authoritative_only() {
                summary.tables_authoritative_only += 1;
            } else if table.physical_only() {
                summary.tables_physical_only += 1;
            }
        }

        for field in self.compared_fields() {
            if field.authoritative_only() {
                summary.fields_authoritative_only += 1;
            } else if field.physical_only() {
                summary.fields_physical_only += 1;
            } else if field.differs() {
                summary.fields_altered += 1;
            }
        }

        summary
    }

    /// Tables with at least one difference, in merged order
    pub fn differing_tables(&self) -> impl Iterator<Item = &MergedTable> {
        self.tables
            .iter()
            .filter(|t| t.differs() || t.fields.iter().any(MergedField::differs))
    }
}

/// Directions worth offering for a comparison.
///
/// Copying to the physical side is pointless when every difference is a
/// physical-only entity, and the deleting variant is pointless when there is
/// nothing to delete.
pub fn available_directions(merged: &MergedDatabase) -> Vec<Direction> {
    let differences = merged.difference_count(false);
    let deletes = merged.difference_count(true);

    Direction::all()
        .into_iter()
        .filter(|direction| match direction {
            Direction::ToPhysical => differences != deletes,
            Direction::ToPhysicalWithDeletes => deletes > 0,
            Direction::Preview | Direction::ToAuthoritative => true,
        })
        .collect()
}
