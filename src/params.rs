//! Parameter table
//!
//! One row per distinct placeholder name, sorted by name and deduplicated.
//! Each row carries a user-editable override value and an explicit set/unset
//! flag; an unset row means "fall back to the placeholder's own default
//! text". Rows are rebuilt wholesale whenever the tree changes, carrying
//! forward by name whatever flag/value state survives the rebuild.

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, EngineResult};

/// Prefix of the synthetic names given to placeholders whose own name is a
/// nested expandable structure.
pub const CONSTRUCTED_PREFIX: &str = "<constructed:";

/// Build the synthetic name for the placeholder at 0-based traversal index
/// `i`.
pub fn constructed_name(i: usize) -> String {
    format!("{CONSTRUCTED_PREFIX}{i}>")
}

/// One row of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRow {
    pub name: String,
    /// True when the name appears in the current tree; false for a name
    /// inherited from a caller's overrides only.
    pub referenced: bool,
    /// Whether the override value is in effect.
    pub is_set: bool,
    /// Override text; meaningful regardless of `is_set` (the flag can be
    /// toggled without losing the text).
    pub value: String,
}

impl ParamRow {
    fn new(name: String, referenced: bool) -> Self {
        Self {
            name,
            referenced,
            is_set: false,
            value: String::new(),
        }
    }
}

/// Ordered, deduplicated parameter table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTable {
    rows: Vec<ParamRow>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table for a new tree.
    ///
    /// `extracted` holds the placeholder names found in the tree, in
    /// traversal order (duplicates allowed); `inherited` maps names a caller
    /// supplied to their values; `old` is the table being replaced. State is
    /// carried forward by matching name: an inherited entry forces the row
    /// set with the supplied value, otherwise the old row's flag and value
    /// survive.
    pub fn rebuild(
        extracted: &[String],
        inherited: Option<&HashMap<String, String>>,
        old: &ParamTable,
    ) -> ParamTable {
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows: Vec<ParamRow> = Vec::new();

        for name in extracted {
            if seen.insert(name.clone()) {
                rows.push(ParamRow::new(name.clone(), true));
            } else if name.starts_with(CONSTRUCTED_PREFIX) {
                // A synthetic name can only repeat if an authored parameter
                // uses the same literal text; flag it rather than picking a
                // winner.
                tracing::warn!(name = %name, "constructed placeholder name collides with an authored one");
            }
        }

        if let Some(inherited) = inherited {
            for name in inherited.keys() {
                let name = name.trim();
                if seen.insert(name.to_string()) {
                    rows.push(ParamRow::new(name.to_string(), false));
                }
            }
        }

        rows.sort_by(|a, b| a.name.cmp(&b.name));

        for row in &mut rows {
            if let Some(value) = inherited.and_then(|m| m.get(&row.name)) {
                row.is_set = true;
                row.value = value.clone();
            } else if let Some(old_row) = old.find(&row.name) {
                row.is_set = old_row.is_set;
                row.value = old_row.value.clone();
            }
        }

        ParamTable { rows }
    }

    pub fn rows(&self) -> &[ParamRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&ParamRow> {
        self.rows.get(row)
    }

    pub fn find(&self, name: &str) -> Option<&ParamRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn row_of_name(&self, name: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.name == name)
    }

    /// Flip (or force to `to`) the set/unset flag of one row. The stored
    /// value is never altered by a flag change.
    pub fn toggle(&mut self, row: usize, to: Option<bool>) -> EngineResult<()> {
        let row = self
            .rows
            .get_mut(row)
            .ok_or_else(|| EngineError::structure(format!("no parameter row {row}")))?;
        row.is_set = to.unwrap_or(!row.is_set);
        Ok(())
    }

    /// Set all rows on, unless every row is already on, in which case set
    /// all off.
    pub fn toggle_all(&mut self) {
        let target = self.rows.iter().any(|r| !r.is_set);
        for row in &mut self.rows {
            row.is_set = target;
        }
    }

    /// The override text iff the row is set (an empty string is a valid
    /// override).
    pub fn resolve_override(&self, row: usize) -> Option<&str> {
        self.rows
            .get(row)
            .filter(|r| r.is_set)
            .map(|r| r.value.as_str())
    }

    pub fn set_value(&mut self, row: usize, value: impl Into<String>) -> EngineResult<()> {
        let row = self
            .rows
            .get_mut(row)
            .ok_or_else(|| EngineError::structure(format!("no parameter row {row}")))?;
        row.value = value.into();
        Ok(())
    }

    /// Blank every value; set/unset flags are untouched.
    pub fn clear_values(&mut self) {
        for row in &mut self.rows {
            row.value.clear();
        }
    }
}
