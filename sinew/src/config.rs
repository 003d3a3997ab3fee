//! Expansion settings.

use serde::{Deserialize, Serialize};
use sinew_expand::DeclLimits;
use sinew_proc::ProcMacroConfig;

quick_error! {
    #[derive(Debug)]
    pub enum ConfigError {
        Json(err: serde_json::Error) {
            from()
            display("bad expansion config: {}", err)
        }
    }
}

/// Everything is optional; missing settings take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub decl: DeclLimits,
    pub proc_macro: ProcMacroConfig,
    /// Most entries kept in each of the engine's caches: finished expansions, and parsed
    /// `macro_rules!` definitions.
    pub memo_capacity: usize,
}

impl Default for ExpansionConfig {
    fn default() -> ExpansionConfig {
        ExpansionConfig {
            decl: DeclLimits::default(),
            proc_macro: ProcMacroConfig::default(),
            memo_capacity: crate::memo::DEFAULT_CAPACITY,
        }
    }
}

impl ExpansionConfig {
    pub fn from_json_str(text: &str) -> Result<ExpansionConfig, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> String {
        // plain data, can't fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
