use bearer_issuer::HeaderConvention;

/// Placeholder storage key. Applications are expected to choose their own.
pub const DEFAULT_STORAGE_KEY: &str = "bearer-holder.token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderConfig {
    /// Key under which the raw token is persisted.
    pub storage_key: String,
    /// Header names to read token signals from.
    pub convention: HeaderConvention,
}

impl HolderConfig {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            convention: HeaderConvention::default(),
        }
    }

    pub fn with_convention(mut self, convention: HeaderConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn uses_placeholder_key(&self) -> bool {
        self.storage_key == DEFAULT_STORAGE_KEY
    }
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_KEY)
    }
}
