use crate::PayerAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Process-wide mapping from payer code to adapter instance, populated at
/// startup, plus the alias table used to resolve free-text insurance
/// provider names to payer codes.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn PayerAdapter>>,
    aliases: HashMap<String, String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its payer code.
    pub fn register(&mut self, adapter: Arc<dyn PayerAdapter>) {
        let code = adapter.payer_code().to_string();
        info!(payer_code = %code, "registered payer adapter");
        self.aliases.insert(Self::normalize(&code), code.clone());
        self.adapters.insert(code, adapter);
    }

    /// Register an extra free-text alias for an already known payer code.
    pub fn register_alias(&mut self, alias: &str, payer_code: &str) {
        self.aliases
            .insert(Self::normalize(alias), payer_code.to_string());
    }

    pub fn get_adapter(&self, payer_code: &str) -> Option<Arc<dyn PayerAdapter>> {
        self.adapters.get(payer_code).cloned()
    }

    /// All registered payer codes, sorted.
    pub fn available_payers(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.adapters.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Best-effort resolution of a free-text insurance-provider name to a
    /// payer code: exact alias match first, then substring in either
    /// direction. `None` means "unsupported provider", never a crash.
    pub fn resolve_payer_code(&self, provider_name: &str) -> Option<String> {
        let needle = Self::normalize(provider_name);
        if needle.is_empty() {
            return None;
        }

        if let Some(code) = self.aliases.get(&needle) {
            return Some(code.clone());
        }

        // Substring fallback needs some signal to avoid one-letter matches
        if needle.len() < 3 {
            return None;
        }

        self.aliases
            .iter()
            .find(|(alias, _)| needle.contains(alias.as_str()) || alias.contains(&needle))
            .map(|(_, code)| code.clone())
    }

    fn normalize(name: &str) -> String {
        name.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase()
    }
}
