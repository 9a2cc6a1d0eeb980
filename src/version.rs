//! Build version reported by `--version` and the startup log line.
//!
//! Release builds stamp `VMTAG_VERSION` at compile time; local builds fall back
//! to the crate version.

const fn stamped_or_crate_version(stamped: Option<&'static str>) -> &'static str {
    match stamped {
        Some(version) if !version.is_empty() => version,
        _ => env!("CARGO_PKG_VERSION"),
    }
}

pub const VERSION: &str = stamped_or_crate_version(option_env!("VMTAG_VERSION"));

/// `name version` as printed by the binary.
pub fn version_line() -> String {
    format!("{} {VERSION}", env!("CARGO_PKG_NAME"))
}
