use tribridge_core::api::{ConcurrencyConfig, ConcurrencyContext, ConcurrencyStrategyPlugin};

/// Grants `per_backend` permits for each distinct backend in a level, so
/// steps spread across backends overlap more than steps piled on one.
pub struct BackendAwareConcurrencyPlugin {
    config: ConcurrencyConfig,
}

pub struct FixedConcurrencyPlugin {
    fixed: usize,
}

impl BackendAwareConcurrencyPlugin {
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self { config }
    }
}

impl FixedConcurrencyPlugin {
    pub fn new(fixed: usize) -> Self {
        Self { fixed }
    }
}

impl ConcurrencyStrategyPlugin for BackendAwareConcurrencyPlugin {
    fn name(&self) -> &str {
        "backend-aware"
    }

    fn calculate_concurrency(&self, context: &ConcurrencyContext) -> usize {
        let min = self.config.min_concurrency.max(1);
        let max = self.config.max_concurrency.max(min);

        let desired = context
            .distinct_backends()
            .max(1)
            .saturating_mul(self.config.per_backend.max(1));

        desired.clamp(min, max).min(context.level_size.max(1))
    }
}

impl ConcurrencyStrategyPlugin for FixedConcurrencyPlugin {
    fn name(&self) -> &str {
        "fixed"
    }

    fn calculate_concurrency(&self, _context: &ConcurrencyContext) -> usize {
        self.fixed.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribridge_core::api::BackendKind;

    fn context(backends: Vec<BackendKind>) -> ConcurrencyContext {
        ConcurrencyContext {
            base_concurrency: 3,
            level_size: backends.len(),
            backends,
        }
    }

    #[test]
    fn test_backend_aware_concurrency() {
        let cfg = ConcurrencyConfig {
            strategy: "backend-aware".to_string(),
            min_concurrency: 1,
            max_concurrency: 5,
            base_concurrency: 3,
            per_backend: 2,
        };
        let plugin = BackendAwareConcurrencyPlugin::new(cfg);

        use BackendKind::*;
        assert_eq!(plugin.calculate_concurrency(&context(vec![Claude, Claude, Claude])), 2);
        assert_eq!(
            plugin.calculate_concurrency(&context(vec![Claude, Gemini, AiStudio])),
            3
        );
        assert_eq!(
            plugin.calculate_concurrency(&context(vec![
                Claude, Gemini, AiStudio, Claude, Gemini, AiStudio
            ])),
            5
        );
    }

    #[test]
    fn test_fixed_concurrency() {
        let plugin = FixedConcurrencyPlugin::new(3);
        assert_eq!(plugin.calculate_concurrency(&context(vec![BackendKind::Claude])), 3);
    }
}
