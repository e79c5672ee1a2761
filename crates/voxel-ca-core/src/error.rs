//! Error types for the core domain model.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the palette and rule composition.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two joined rules bind the same slot to different state names.
    #[error("slot {slot} is bound to both '{existing}' and '{incoming}'")]
    SlotConflict {
        slot: usize,
        existing: String,
        incoming: String,
    },

    /// The palette does not start with the empty material.
    #[error("palette must declare 'air' as its first block, found '{found}'")]
    PaletteMissingAir { found: String },

    /// A block name appears twice in the palette.
    #[error("duplicate block in palette: {name}")]
    DuplicateBlock { name: String },

    /// A block property declares no values.
    #[error("property '{property}' of block '{block}' has no values")]
    EmptyProperty { block: String, property: String },

    /// A state id does not belong to any block.
    #[error("unknown block state: {state}")]
    UnknownState { state: i64 },

    /// A block does not declare the property.
    #[error("block '{block}' has no property '{property}'")]
    UnknownProperty { block: String, property: String },

    /// A property does not allow the value.
    #[error("property '{property}' of block '{block}' does not accept '{value}'")]
    UnknownPropertyValue {
        block: String,
        property: String,
        value: String,
    },

    /// Palette JSON could not be decoded.
    #[error("palette parse error: {0}")]
    PaletteParse(#[from] serde_json::Error),

    /// I/O error (file operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
