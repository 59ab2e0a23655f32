//! Adapter registry
//!
//! Maps channel names to [`ChannelAdapter`] instances. Built once at startup
//! (every adapter registers before the first cycle runs) and read-only
//! afterwards. A roster entry naming a channel that was never registered is
//! a logged error at dispatch time, not a fatal one.

use crate::ports::channel_adapter::ChannelAdapter;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of channel adapters, keyed by channel name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under a channel name
    pub fn register<A: ChannelAdapter + 'static>(self, name: impl Into<String>, adapter: A) -> Self {
        self.register_arc(name, Arc::new(adapter))
    }

    /// Register an adapter under a channel name (Arc version)
    pub fn register_arc(
        mut self,
        name: impl Into<String>,
        adapter: Arc<dyn ChannelAdapter>,
    ) -> Self {
        self.adapters.insert(name.into(), adapter);
        self
    }

    /// Look up the adapter for a channel name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered channel names, sorted
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CycleHandle;
    use crate::ports::channel_adapter::AdapterError;
    use async_trait::async_trait;
    use freeday_domain::{Outcome, Person};

    struct NullAdapter;

    #[async_trait]
    impl ChannelAdapter for NullAdapter {
        async fn request(&self, _: &Person, _: &CycleHandle) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn gather(&self, _: &Person, _: &CycleHandle) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn respond(
            &self,
            _: &Person,
            _: &CycleHandle,
            _: &Outcome,
        ) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = AdapterRegistry::new()
            .register("discord", NullAdapter)
            .register("telegram", NullAdapter);

        assert!(registry.get("discord").is_some());
        assert!(registry.get("irc").is_none());
        assert_eq!(registry.channel_names(), vec!["discord", "telegram"]);
    }
}
