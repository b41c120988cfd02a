//! Balancing pass configuration
//!
//! Weights, limits and eligibility rules travel as one explicit value passed
//! into the analyzer and planner. There is no process-wide mutable engine
//! state, so unit tests can run many configurations in parallel.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::FilterRules;

/// Default score-distance-from-mean below which a node counts as balanced
pub const DEFAULT_TOLERANCE: f64 = 0.2;

/// Default weight of the CPU utilization term
pub const DEFAULT_PERCENT_CPU: f64 = 0.4;

/// Default weight of the memory utilization term
pub const DEFAULT_PERCENT_MEM: f64 = 0.6;

/// Default cap on plan length and in-flight migration requests
pub const DEFAULT_MAX_MIGRATIONS: usize = 5;

/// Slack allowed when checking that the weights sum to 1.0
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Configuration consumed by the core for one balancing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Absolute score-unit band around the cluster mean
    pub tolerance: f64,
    /// Weight of the CPU utilization term; pairs with `percent_mem`
    pub percent_cpu: f64,
    /// Weight of the memory utilization term; pairs with `percent_cpu`
    pub percent_mem: f64,
    /// Upper bound on plan length and concurrent dispatches
    pub max_migrations: usize,
    /// Report the plan without invoking any migration
    pub dry_run: bool,
    /// Node/workload eligibility rules
    pub rules: FilterRules,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            percent_cpu: DEFAULT_PERCENT_CPU,
            percent_mem: DEFAULT_PERCENT_MEM,
            max_migrations: DEFAULT_MAX_MIGRATIONS,
            dry_run: false,
            rules: FilterRules::default(),
        }
    }
}

impl BalancerConfig {
    /// Validate the configuration before any snapshot read
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.percent_cpu + self.percent_mem;
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::WeightSum {
                cpu: self.percent_cpu,
                mem: self.percent_mem,
                sum,
            });
        }
        if !(0.0..1.0).contains(&self.tolerance) {
            return Err(ConfigError::ToleranceRange(self.tolerance));
        }
        if self.max_migrations == 0 {
            return Err(ConfigError::MaxMigrationsZero);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BalancerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = BalancerConfig {
            percent_cpu: 0.5,
            percent_mem: 0.6,
            ..BalancerConfig::default()
        };

        match config.validate() {
            Err(ConfigError::WeightSum { sum, .. }) => assert!((sum - 1.1).abs() < 1e-9),
            other => panic!("expected WeightSum error, got {other:?}"),
        }
    }

    #[test]
    fn test_weights_allow_float_slack() {
        let config = BalancerConfig {
            percent_cpu: 0.1 + 0.2, // 0.30000000000000004
            percent_mem: 0.7,
            ..BalancerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tolerance_range() {
        let config = BalancerConfig {
            tolerance: 1.0,
            ..BalancerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ToleranceRange(1.0)));

        let config = BalancerConfig {
            tolerance: -0.1,
            ..BalancerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ToleranceRange(-0.1)));
    }

    #[test]
    fn test_max_migrations_must_be_positive() {
        let config = BalancerConfig {
            max_migrations: 0,
            ..BalancerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MaxMigrationsZero));
    }
}
