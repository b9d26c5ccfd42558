//! Dispatcher configuration

use rustc_hash::FxHashSet;
use weave_sdk::IntegrationId;

/// Dispatcher options.
///
/// The activation *source* (files, env, remote config) is an external
/// collaborator; this struct is the resolved policy the dispatcher
/// consults. Integrations disabled here are short-circuited: their
/// sites are created directly in the disabled state, with no provider
/// call and no failure report.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Global kill switch. When false, every site is disabled.
    pub enabled: bool,
    /// Integrations to disable by policy
    pub disabled_integrations: FxHashSet<IntegrationId>,
}

impl DispatcherOptions {
    /// True when sites for this integration may bind hooks
    pub fn integration_enabled(&self, integration: &IntegrationId) -> bool {
        self.enabled && !self.disabled_integrations.contains(integration)
    }

    /// Disable one integration by policy
    pub fn with_integration_disabled(mut self, integration: IntegrationId) -> Self {
        self.disabled_integrations.insert(integration);
        self
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_integrations: FxHashSet::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let options = DispatcherOptions::default();
        assert!(options.integration_enabled(&IntegrationId::new("http")));
    }

    #[test]
    fn test_kill_switch() {
        let options = DispatcherOptions {
            enabled: false,
            ..Default::default()
        };
        assert!(!options.integration_enabled(&IntegrationId::new("http")));
    }

    #[test]
    fn test_per_integration_disable() {
        let options =
            DispatcherOptions::default().with_integration_disabled(IntegrationId::new("sql"));
        assert!(!options.integration_enabled(&IntegrationId::new("sql")));
        assert!(options.integration_enabled(&IntegrationId::new("http")));
    }
}
