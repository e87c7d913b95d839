//! Per-heap behavior configuration.
//!
//! The double-release policy is set per heap instance:
//! - `report` (default): a repeated release returns a distinguishable
//!   error. The directory is never mutated by the repeated call.
//! - `silent`: the repeated release is swallowed, matching the legacy
//!   free() contract. The attempt still shows up in the metrics.
//!
//! Harness runs read the policy from the `BRKALLOC_MODE` environment
//! variable; the heap itself never touches the environment.

/// How a repeated release of the same handle is answered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoubleReleasePolicy {
    /// Surface a `DoubleRelease` error to the caller.
    #[default]
    Report,
    /// Swallow the repeated release, counting it in the metrics only.
    Silent,
}

impl DoubleReleasePolicy {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "report" | "strict" | "fault" => Self::Report,
            "silent" | "lenient" | "legacy" => Self::Silent,
            _ => Self::Report,
        }
    }

    /// Returns true if a repeated release surfaces as an error.
    #[must_use]
    pub const fn reports_fault(self) -> bool {
        matches!(self, Self::Report)
    }
}

/// Owned configuration for one heap instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Answer to repeated releases of the same handle.
    pub double_release: DoubleReleasePolicy,
}

impl HeapConfig {
    /// Configuration with an explicit double-release policy.
    #[must_use]
    pub const fn new(double_release: DoubleReleasePolicy) -> Self {
        Self { double_release }
    }

    /// Reads `BRKALLOC_MODE` once and parses it loosely.
    #[must_use]
    pub fn from_env() -> Self {
        let double_release = std::env::var("BRKALLOC_MODE")
            .map(|v| DoubleReleasePolicy::from_str_loose(&v))
            .unwrap_or_default();
        Self { double_release }
    }
}
