//! Category entity - user-scoped labels for transactions.
//!
//! The whole category list lives in one remote document per user and is
//! overwritten wholesale on every mutation; ids inside the list are never
//! re-minted by the server.

use serde::{Deserialize, Serialize};

use super::{EntityId, TransactionKind};

/// A transaction category with its display attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: EntityId,
    /// Display name; unique per user in practice, not enforced.
    pub name: String,
    /// Hex color used by the UI.
    pub color: String,
    /// Icon glyph shown next to the name.
    pub icon: String,
    /// Whether the category files income or expenses.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

/// Shallow patch applied to a category by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub kind: Option<TransactionKind>,
}

impl CategoryPatch {
    /// Merges the patch into a category in place.
    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(color) = &self.color {
            category.color = color.clone();
        }
        if let Some(icon) = &self.icon {
            category.icon = icon.clone();
        }
        if let Some(kind) = self.kind {
            category.kind = kind;
        }
    }
}
