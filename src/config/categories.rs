//! Default category seed.
//!
//! New users start from a fixed category set. The set can be overridden in
//! `config.toml`; these are the built-in defaults the app has always
//! shipped with.

use serde::Deserialize;

use crate::entities::{Category, EntityId, TransactionKind};

/// One seeded category as declared in `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CategorySeed {
    /// Display name.
    pub name: String,
    /// Hex color.
    pub color: String,
    /// Icon glyph.
    pub icon: String,
    /// `income` or `expense`.
    pub kind: TransactionKind,
}

impl CategorySeed {
    fn new(name: &str, color: &str, icon: &str, kind: TransactionKind) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            kind,
        }
    }
}

/// The built-in seed used when `config.toml` declares no categories.
pub fn builtin_seed() -> Vec<CategorySeed> {
    vec![
        CategorySeed::new("Salario", "#10b981", "💰", TransactionKind::Income),
        CategorySeed::new("Comida", "#ef4444", "🍔", TransactionKind::Expense),
        CategorySeed::new("Transporte", "#f59e0b", "🚗", TransactionKind::Expense),
        CategorySeed::new("Entretenimiento", "#8b5cf6", "🎮", TransactionKind::Expense),
        CategorySeed::new("Facturas", "#3b82f6", "📄", TransactionKind::Expense),
    ]
}

/// Materializes the seed into categories with stable small local ids.
pub fn seed_to_categories(seed: &[CategorySeed]) -> Vec<Category> {
    seed.iter()
        .enumerate()
        .map(|(i, s)| Category {
            id: EntityId::Local((i + 1).to_string()),
            name: s.name.clone(),
            color: s.color.clone(),
            icon: s.icon.clone(),
            kind: s.kind,
        })
        .collect()
}
