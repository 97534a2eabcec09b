//! Naming rules for derived resources.
//!
//! Install names, config map names, execution unit names and mount paths
//! are all derived from an application name plus an optional suffix.

use std::sync::OnceLock;

use regex::Regex;

/// Action run by an execution unit.
pub const ACTION_APPLY: &str = "apply";
pub const ACTION_APPLY_OUTPUTS: &str = "apply outputs";
pub const ACTION_DIFF: &str = "diff";
pub const ACTION_DELETE: &str = "delete";
pub const ACTION_SMOKETEST: &str = "smoketest";
pub const ACTION_WAIT: &str = "wait";
pub const ACTION_OUTPUTS: &str = "outputs";

/// Documents in an install's configuration bundle.
pub const PARAMETERS_FILE: &str = "parameters.json";
pub const INSTALL_FILE: &str = "install.json";
pub const REQUIRES_FILE: &str = "requires.json";
pub const FLAVOR_FILE: &str = "flavor.json";

/// Mount point of an install's own configuration bundle.
pub const CONFIG_MOUNT_PATH: &str = "/config";
/// Parent of the upstream dependency mounts.
pub const INPUTS_MOUNT_PATH: &str = "/config/inputs";

/// `name` or `name-suffix` when a suffix is set.
pub fn suffixed(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        name.to_string()
    } else {
        format!("{name}-{suffix}")
    }
}

/// Deterministic install name from the application, an optional explicit
/// name, and an optional suffix.
pub fn install_name(app_name: &str, explicit_name: Option<&str>, suffix: &str) -> String {
    let base = explicit_name
        .filter(|name| !name.is_empty())
        .unwrap_or(app_name);
    suffixed(base, suffix)
}

/// Record name of an application: `<name>-<version>`.
pub fn application_record_name(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

pub fn config_map_name(install_name: &str) -> String {
    format!("{install_name}-config")
}

/// Execution unit name for an action. Smoketests get their own unit so they
/// never collide with an apply.
pub fn job_name(install_name: &str, action: &str) -> String {
    if action == ACTION_SMOKETEST {
        format!("{install_name}-smoketest")
    } else {
        install_name.to_string()
    }
}

/// Container arguments for an action (`"apply outputs"` → `["apply", "outputs"]`).
pub fn action_args(action: &str) -> Vec<String> {
    action.split_whitespace().map(str::to_string).collect()
}

pub fn input_mount_path(dependency_name: &str) -> String {
    format!("{INPUTS_MOUNT_PATH}/{dependency_name}")
}

/// Record holding every lazily generated secret.
pub const GLOBAL_SECRET_NAME: &str = "kb-global-secrets";

/// Key of a generated secret in the global secret record.
pub fn secret_key(install_name: &str, parameter_name: &str) -> String {
    format!("{install_name}.{parameter_name}")
}

/// Lowercase and replace anything outside `[a-z0-9-]` with `-`.
pub fn sanitize(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| {
        Regex::new("[^a-z0-9-]").unwrap_or_else(|_| unreachable!("static pattern"))
    });
    invalid.replace_all(&name.to_lowercase(), "-").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_name_honors_explicit_name_and_suffix() {
        assert_eq!(install_name("pg", None, ""), "pg");
        assert_eq!(install_name("pg", None, "primary"), "pg-primary");
        assert_eq!(install_name("pg", Some("db"), "primary"), "db-primary");
        assert_eq!(install_name("pg", Some(""), ""), "pg");
    }

    #[test]
    fn smoketest_gets_its_own_job() {
        assert_eq!(job_name("app", ACTION_APPLY_OUTPUTS), "app");
        assert_eq!(job_name("app", ACTION_SMOKETEST), "app-smoketest");
    }

    #[test]
    fn action_args_split_on_whitespace() {
        assert_eq!(action_args(ACTION_APPLY_OUTPUTS), vec!["apply", "outputs"]);
        assert_eq!(action_args(ACTION_DIFF), vec!["diff"]);
    }

    #[test]
    fn derived_names() {
        assert_eq!(config_map_name("pg-primary"), "pg-primary-config");
        assert_eq!(input_mount_path("pg-primary"), "/config/inputs/pg-primary");
        assert_eq!(secret_key("app", "password"), "app.password");
        assert_eq!(application_record_name("app", "1.2.0"), "app-1.2.0");
        assert_eq!(sanitize("My_Registry.1"), "my-registry-1");
    }
}
