//! Engine-wide options handed to every feature constructor
//!
//! Options come from `CONVOY_*` environment variables. Reading goes through
//! [`EnvSource`] so tests never touch process state.

use tracing::warn;

/// Run the OTel collector as a node agent sidecar
pub const ENV_OTEL_AGENT_ENABLED: &str = "CONVOY_OTEL_AGENT_ENABLED";
/// Run process checks inside the core agent instead of the process agent
pub const ENV_PROCESS_CHECKS_IN_CORE_AGENT: &str = "CONVOY_PROCESS_CHECKS_IN_CORE_AGENT";

/// Source of raw option values
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Raw value of a variable, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Engine-wide knobs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureOptions {
    /// OTel agent sidecar runs next to the core agent
    pub otel_agent_enabled: bool,
    /// Process checks run in the core agent
    pub process_checks_in_core_agent: bool,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            otel_agent_enabled: false,
            process_checks_in_core_agent: true,
        }
    }
}

impl FeatureOptions {
    /// Read options from the process environment
    pub fn from_env() -> Self {
        Self::from_source(&OsEnv)
    }

    /// Read options from any source; unset or malformed values keep the default
    pub fn from_source(env: &dyn EnvSource) -> Self {
        let defaults = Self::default();
        Self {
            otel_agent_enabled: read_bool(env, ENV_OTEL_AGENT_ENABLED, defaults.otel_agent_enabled),
            process_checks_in_core_agent: read_bool(
                env,
                ENV_PROCESS_CHECKS_IN_CORE_AGENT,
                defaults.process_checks_in_core_agent,
            ),
        }
    }
}

fn read_bool(env: &dyn EnvSource, key: &str, default: bool) -> bool {
    let Some(raw) = env.var(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(key, value = %raw, default, "ignoring malformed boolean option");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use rstest::rstest;

    fn source(key: &'static str, value: &'static str) -> MockEnvSource {
        let mut mock = MockEnvSource::new();
        mock.expect_var()
            .with(eq(key))
            .returning(move |_| Some(value.to_string()));
        mock.expect_var().returning(|_| None);
        mock
    }

    #[test]
    fn unset_environment_yields_defaults() {
        let mut mock = MockEnvSource::new();
        mock.expect_var().returning(|_| None);
        assert_eq!(FeatureOptions::from_source(&mock), FeatureOptions::default());
    }

    #[rstest]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("1", true)]
    #[case("off", false)]
    #[case("banana", false)]
    fn otel_agent_flag(#[case] raw: &'static str, #[case] expected: bool) {
        let opts = FeatureOptions::from_source(&source(ENV_OTEL_AGENT_ENABLED, raw));
        assert_eq!(opts.otel_agent_enabled, expected);
    }

    #[test]
    fn malformed_value_keeps_true_default() {
        let opts = FeatureOptions::from_source(&source(ENV_PROCESS_CHECKS_IN_CORE_AGENT, "maybe"));
        assert!(opts.process_checks_in_core_agent);
    }
}
