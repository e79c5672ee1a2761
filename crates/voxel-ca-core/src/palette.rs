//! Block palette: the registry that maps material names to primitive ids.
//!
//! Every block owns a contiguous range of state ids, one per combination of
//! its property values. The last declared property varies fastest. `air` is
//! always the first block and therefore state `0`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// The primitive id of the empty material.
pub const AIR: i64 = 0;

const NAMESPACE: &str = "minecraft:";

/// A named block property and its allowed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProperty {
    pub name: String,
    pub values: Vec<String>,
}

impl BlockProperty {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Declaration of a block as found in palette files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<BlockProperty>,
}

impl BlockDefinition {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: BlockProperty) -> Self {
        self.properties.push(property);
        self
    }

    fn state_count(&self) -> i64 {
        self.properties
            .iter()
            .map(|p| p.values.len() as i64)
            .product()
    }

    /// Stride of property `index` inside the block's state range.
    fn stride(&self, index: usize) -> i64 {
        self.properties[index + 1..]
            .iter()
            .map(|p| p.values.len() as i64)
            .product()
    }
}

#[derive(Debug, Deserialize)]
struct PaletteFile {
    blocks: Vec<BlockDefinition>,
}

#[derive(Debug, Clone)]
struct BlockEntry {
    definition: BlockDefinition,
    base: i64,
}

/// Registry of materials and their state ids.
#[derive(Debug, Clone)]
pub struct BlockPalette {
    blocks: Vec<BlockEntry>,
    by_name: HashMap<String, usize>,
    state_count: i64,
}

impl BlockPalette {
    /// Build a palette from block declarations, assigning ids in order.
    pub fn from_definitions(definitions: Vec<BlockDefinition>) -> CoreResult<Self> {
        match definitions.first() {
            Some(first) if first.name == "air" && first.state_count() == 1 => {}
            Some(first) => {
                return Err(CoreError::PaletteMissingAir {
                    found: first.name.clone(),
                })
            }
            None => {
                return Err(CoreError::PaletteMissingAir {
                    found: String::new(),
                })
            }
        }

        let mut blocks = Vec::with_capacity(definitions.len());
        let mut by_name = HashMap::with_capacity(definitions.len());
        let mut next = 0i64;

        for definition in definitions {
            if let Some(property) = definition.properties.iter().find(|p| p.values.is_empty()) {
                return Err(CoreError::EmptyProperty {
                    block: definition.name.clone(),
                    property: property.name.clone(),
                });
            }
            if by_name.insert(definition.name.clone(), blocks.len()).is_some() {
                return Err(CoreError::DuplicateBlock {
                    name: definition.name,
                });
            }
            let count = definition.state_count();
            blocks.push(BlockEntry {
                definition,
                base: next,
            });
            next += count;
        }

        debug!(blocks = blocks.len(), states = next, "palette_built");

        Ok(Self {
            blocks,
            by_name,
            state_count: next,
        })
    }

    /// Parse a palette from JSON of the form `{"blocks": [...]}`.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let file: PaletteFile = serde_json::from_str(json)?;
        Self::from_definitions(file.blocks)
    }

    /// Load a palette from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Palette with common terrain and wool blocks plus redstone wire.
    pub fn builtin() -> Self {
        let mut definitions: Vec<BlockDefinition> = [
            "air",
            "stone",
            "cobblestone",
            "dirt",
            "grass_block",
            "sand",
            "gravel",
            "glass",
            "oak_log",
            "oak_planks",
            "hay_block",
            "water",
            "lava",
        ]
        .into_iter()
        .map(BlockDefinition::simple)
        .collect();

        for color in [
            "white",
            "orange",
            "yellow",
            "lime",
            "green",
            "cyan",
            "light_blue",
            "blue",
            "purple",
            "red",
            "black",
        ] {
            definitions.push(BlockDefinition::simple(format!("{color}_wool")));
        }

        let power: Vec<String> = (0..16).map(|p| p.to_string()).collect();
        let power: Vec<&str> = power.iter().map(String::as_str).collect();
        let side = ["none", "side", "up"];
        definitions.push(
            BlockDefinition::simple("redstone_wire")
                .with_property(BlockProperty::new("power", &power))
                .with_property(BlockProperty::new("north", &side))
                .with_property(BlockProperty::new("east", &side))
                .with_property(BlockProperty::new("south", &side))
                .with_property(BlockProperty::new("west", &side)),
        );

        let blocks = definitions
            .into_iter()
            .scan(0i64, |next, definition| {
                let base = *next;
                *next += definition.state_count();
                Some(BlockEntry { definition, base })
            })
            .collect::<Vec<_>>();
        let by_name = blocks
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.definition.name.clone(), i))
            .collect();
        let state_count = blocks
            .last()
            .map(|entry| entry.base + entry.definition.state_count())
            .unwrap_or(1);

        Self {
            blocks,
            by_name,
            state_count,
        }
    }

    /// Default state of a block, accepting an optional `minecraft:` prefix.
    pub fn resolve(&self, name: &str) -> Option<i64> {
        let name = name.strip_prefix(NAMESPACE).unwrap_or(name);
        self.by_name.get(name).map(|&i| self.blocks[i].base)
    }

    /// Re-encode `state` with `property` set to `value`.
    pub fn with_property(&self, state: i64, property: &str, value: &str) -> CoreResult<i64> {
        let entry = self.entry_of(state).ok_or(CoreError::UnknownState { state })?;
        let definition = &entry.definition;
        let index = definition
            .properties
            .iter()
            .position(|p| p.name == property)
            .ok_or_else(|| CoreError::UnknownProperty {
                block: definition.name.clone(),
                property: property.to_string(),
            })?;
        let prop = &definition.properties[index];
        let new_value = prop
            .values
            .iter()
            .position(|v| v == value)
            .ok_or_else(|| CoreError::UnknownPropertyValue {
                block: definition.name.clone(),
                property: property.to_string(),
                value: value.to_string(),
            })? as i64;

        let stride = definition.stride(index);
        let size = prop.values.len() as i64;
        let local = state - entry.base;
        let current = (local / stride) % size;
        Ok(state + (new_value - current) * stride)
    }

    /// Value of `property` for `state`.
    pub fn property_value(&self, state: i64, property: &str) -> Option<&str> {
        let entry = self.entry_of(state)?;
        let definition = &entry.definition;
        let index = definition
            .properties
            .iter()
            .position(|p| p.name == property)?;
        let prop = &definition.properties[index];
        let local = state - entry.base;
        let value = (local / definition.stride(index)) % prop.values.len() as i64;
        prop.values.get(value as usize).map(String::as_str)
    }

    /// Block name owning `state`.
    pub fn name_of(&self, state: i64) -> Option<&str> {
        self.entry_of(state).map(|e| e.definition.name.as_str())
    }

    /// Block declaration owning `state`.
    pub fn block_of(&self, state: i64) -> Option<&BlockDefinition> {
        self.entry_of(state).map(|e| &e.definition)
    }

    /// Render a state as `name[prop=value,...]`.
    pub fn describe(&self, state: i64) -> String {
        let Some(block) = self.block_of(state) else {
            return format!("<unknown:{state}>");
        };
        if block.properties.is_empty() {
            return block.name.clone();
        }
        let props: Vec<String> = block
            .properties
            .iter()
            .filter_map(|p| {
                self.property_value(state, &p.name)
                    .map(|v| format!("{}={}", p.name, v))
            })
            .collect();
        format!("{}[{}]", block.name, props.join(","))
    }

    /// Total number of state ids.
    pub fn state_count(&self) -> i64 {
        self.state_count
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn entry_of(&self, state: i64) -> Option<&BlockEntry> {
        if state < 0 || state >= self.state_count {
            return None;
        }
        let index = self.blocks.partition_point(|e| e.base <= state);
        index.checked_sub(1).map(|i| &self.blocks[i])
    }
}

impl Default for BlockPalette {
    fn default() -> Self {
        Self::builtin()
    }
}
