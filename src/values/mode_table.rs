use std::collections::HashMap;
use std::fmt::Debug;

use crate::utils::error::ModbusError;

/// Bidirectional mapping between device modes and the register values that
/// encode them. Lookups that miss in either direction resolve to the fallback
/// entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeTable<M> {
    entries: Vec<(M, u16)>,
    fallback: usize,
}

impl<M: Clone + PartialEq + Debug> ModeTable<M> {
    pub fn new(entries: Vec<(M, u16)>, fallback: M) -> Result<Self, ModbusError> {
        for (i, (mode, value)) in entries.iter().enumerate() {
            for (other_mode, other_value) in &entries[i + 1..] {
                if mode == other_mode {
                    return Err(ModbusError::ConfigurationError(format!(
                        "mode {:?} is mapped more than once",
                        mode
                    )));
                }
                if value == other_value {
                    return Err(ModbusError::ConfigurationError(format!(
                        "register value {} is used by both {:?} and {:?}",
                        value, mode, other_mode
                    )));
                }
            }
        }

        let fallback = entries
            .iter()
            .position(|(mode, _)| *mode == fallback)
            .ok_or_else(|| {
                ModbusError::ConfigurationError(format!(
                    "fallback mode {:?} is not in the table",
                    fallback
                ))
            })?;

        Ok(Self { entries, fallback })
    }

    pub fn fallback(&self) -> &M {
        &self.entries[self.fallback].0
    }

    pub fn modes(&self) -> impl Iterator<Item = &M> {
        self.entries.iter().map(|(mode, _)| mode)
    }

    pub fn to_register(&self, mode: &M) -> u16 {
        self.entries
            .iter()
            .find(|(m, _)| m == mode)
            .unwrap_or(&self.entries[self.fallback])
            .1
    }

    pub fn from_register(&self, value: u16) -> &M {
        &self
            .entries
            .iter()
            .find(|(_, v)| *v == value)
            .unwrap_or(&self.entries[self.fallback])
            .0
    }
}

impl ModeTable<String> {
    /// Build from a name -> register value map such as a `values` block in a
    /// device definition. Entries are ordered by register value.
    pub fn from_values(values: &HashMap<String, u16>, fallback: &str) -> Result<Self, ModbusError> {
        let mut entries: Vec<(String, u16)> = values
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        entries.sort_by_key(|(_, value)| *value);
        Self::new(entries, fallback.to_string())
    }
}
