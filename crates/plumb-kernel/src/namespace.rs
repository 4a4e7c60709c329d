//! Namespace qualification of pipe names.
//!
//! Every pipe lives in a namespace and is stored under `<ns>//<name>`. Bare
//! names are qualified with the caller's namespace; names that already carry
//! the separator are explicit cross-namespace references and pass through.

/// Separator between namespace and local pipe name.
pub const SEPARATOR: &str = "//";

/// Namespace used when a caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Whether `name` already carries a namespace.
pub fn is_qualified(name: &str) -> bool {
    name.contains(SEPARATOR)
}

/// Qualify `name` with `namespace` unless it is already qualified.
pub fn qualify(namespace: &str, name: &str) -> String {
    if is_qualified(name) {
        name.to_string()
    } else {
        format!("{namespace}{SEPARATOR}{name}")
    }
}

/// Prefix shared by every pipe in `namespace`.
pub fn prefix(namespace: &str) -> String {
    format!("{namespace}{SEPARATOR}")
}

/// Whether the qualified `name` belongs to `namespace`.
pub fn in_namespace(namespace: &str, name: &str) -> bool {
    name.strip_prefix(namespace)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Split a qualified name into `(namespace, local)`.
pub fn split(name: &str) -> Option<(&str, &str)> {
    name.split_once(SEPARATOR)
}
