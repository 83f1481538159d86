//! Compiled, immutable combiner configuration.

use std::path::Path;
use std::time::Duration;

use querycomb_parser::{
    CombinerConfig, ReplaceRule, SlotConfig, SlotKind, StoreSettings, parse_config_file,
    parse_config_yaml,
};

use crate::condition::{CompiledCondition, compile_condition};
use crate::error::Result;
use crate::key::KeyExtractor;
use crate::transform::TimeFormatter;

/// A slot ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledSlot {
    pub kind: SlotKind,
    pub condition: CompiledCondition,
    pub replace: Vec<ReplaceRule>,
    pub time_key: Option<String>,
}

/// Everything the combiner and reaper need, compiled once.
///
/// Shared by reference between the batch path and the reaper.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    /// Configured slots in evaluation order: catch, prolong, dump, release.
    pub slots: Vec<CompiledSlot>,
    pub key_extractor: KeyExtractor,
    pub formatter: TimeFormatter,
    pub key_prefix: String,
    pub ttl_secs: u64,
    pub buffer_size: usize,
    pub continuous_dump: bool,
    pub tag: String,
    pub flush_interval: Duration,
    pub remove_interval: Duration,
    pub timestamp_fields: Vec<String>,
    pub store: StoreSettings,
}

impl CompiledConfig {
    /// Compile a parsed configuration.
    pub fn compile(config: &CombinerConfig) -> Result<Self> {
        let slots = config
            .slots()
            .map(compile_slot)
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledConfig {
            slots,
            key_extractor: KeyExtractor::new(config.identify.clone()),
            formatter: TimeFormatter::new(config.time_format.clone())?,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: config.ttl_secs,
            buffer_size: config.buffer_size,
            continuous_dump: config.continuous_dump,
            tag: config.tag.clone(),
            flush_interval: Duration::from_secs(config.flush_interval_secs),
            remove_interval: Duration::from_secs(config.remove_interval_secs),
            timestamp_fields: config.timestamp_fields.clone(),
            store: config.store.clone(),
        })
    }

    /// Parse and compile YAML configuration text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::compile(&parse_config_yaml(yaml)?)
    }

    /// Parse and compile a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::compile(&parse_config_file(path)?)
    }

    /// Store key of the blob for `session`.
    pub fn session_key(&self, session: &str) -> String {
        format!("{}{}", self.key_prefix, session)
    }

    /// Store key of the session index.
    pub fn index_key(&self) -> &str {
        &self.key_prefix
    }

    pub fn slot(&self, kind: SlotKind) -> Option<&CompiledSlot> {
        self.slots.iter().find(|s| s.kind == kind)
    }
}

fn compile_slot(slot: &SlotConfig) -> Result<CompiledSlot> {
    Ok(CompiledSlot {
        kind: slot.kind,
        condition: compile_condition(&slot.source, &slot.condition)?,
        replace: slot.replace.clone(),
        time_key: slot.time_key.clone(),
    })
}
