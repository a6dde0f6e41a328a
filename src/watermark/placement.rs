//! Role-to-position placement table.
//!
//! Each requested position is drawn with exactly one of the two marks. The
//! table decides which: by default the vendor mark owns `bottom-left` and
//! the platform mark owns every other position, including unrecognized ones.

use super::{Position, WatermarkError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which mark is drawn at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkRole {
    Vendor,
    Platform,
}

impl MarkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vendor => "vendor",
            Self::Platform => "platform",
        }
    }
}

/// Explicit mapping from position to mark role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementTable {
    entries: BTreeMap<Position, MarkRole>,
    fallback: MarkRole,
}

impl Default for PlacementTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Position::BottomLeft, MarkRole::Vendor);
        Self {
            entries,
            fallback: MarkRole::Platform,
        }
    }
}

impl PlacementTable {
    /// Build a table from the default rule plus explicit overrides.
    ///
    /// Overrides for `Unrecognized` are rejected: unrecognized positions
    /// always use the fallback role.
    pub fn with_overrides(
        overrides: &BTreeMap<Position, MarkRole>,
    ) -> Result<Self, WatermarkError> {
        let mut table = Self::default();
        for (position, role) in overrides {
            if !position.is_recognized() {
                return Err(WatermarkError::ConfigError(
                    "placement overrides must use a named position".to_string(),
                ));
            }
            table.entries.insert(*position, *role);
        }
        Ok(table)
    }

    /// Role drawn at `position`.
    pub fn role_for(&self, position: Position) -> MarkRole {
        self.entries
            .get(&position)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Positions currently assigned to `role` among the named positions.
    pub fn positions_for(&self, role: MarkRole) -> Vec<Position> {
        Position::NAMED
            .into_iter()
            .filter(|p| self.role_for(*p) == role)
            .collect()
    }
}
