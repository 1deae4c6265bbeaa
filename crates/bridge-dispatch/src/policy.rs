//! Static allow-list authorization for MQTT topic areas/actions.
//!
//! A general rules engine is out of scope; the policy is exactly the
//! handful of config-driven toggles the daemon exposes, compiled once at
//! startup.

/// Authorization toggles, sourced from the daemon's configuration.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    /// Whether `file/*` actions may target paths outside a scratch
    /// directory (normally only `/tmp`-rooted paths are writable).
    pub allow_non_tmp_paths: bool,
    /// Whether the `shell/*` area is enabled at all.
    pub shell_enabled: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self { allow_non_tmp_paths: false, shell_enabled: false }
    }
}

impl AuthPolicy {
    /// Whether `area`/`action` is permitted under this policy.
    #[must_use]
    pub fn is_allowed(&self, area: &str, action: Option<&str>) -> bool {
        match area {
            "shell" => self.shell_enabled,
            "file" if !self.allow_non_tmp_paths => action != Some("write") && action != Some("remove"),
            _ => true,
        }
    }
}
