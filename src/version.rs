//! Build identity reported by `--version` and the `initialize` response.

/// Crate version from the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit the binary was built from, injected by the build pipeline
/// through `GIT_COMMIT`; "unknown" for local builds.
pub const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// Build timestamp injected through `BUILD_DATE`; "unknown" for local builds.
pub const BUILD_DATE: &str = match option_env!("BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

/// The multi-line template printed by `--version`.
pub fn human_version() -> String {
    format!(
        "Version: {}\nCommit: {}\nBuild Date: {}",
        VERSION, GIT_COMMIT, BUILD_DATE
    )
}

/// User-Agent value sent on every upstream registry call.
pub fn user_agent() -> String {
    format!("terraform-mcp-server/{}", VERSION)
}
