//! Service entrypoint resolution
//!
//! The web application is referenced explicitly as `dotted.module:attribute`
//! and checked against the application root before anything is launched.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::SupervisorConfig;
use crate::{Error, Result};

const DEFAULT_ATTRIBUTE: &str = "app";

/// A resolved, loadable web application reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntrypoint {
    /// Dotted module path, e.g. `cca.app`
    pub module: String,

    /// Application object inside the module
    pub attribute: String,

    /// Module source the reference resolved to
    pub source: PathBuf,
}

impl ServiceEntrypoint {
    /// Reference in the form the server runtime expects
    pub fn reference(&self) -> String {
        format!("{}:{}", self.module, self.attribute)
    }
}

impl fmt::Display for ServiceEntrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

/// Locate the configured entrypoint under the application root
pub fn locate_service_entrypoint(config: &SupervisorConfig) -> Result<ServiceEntrypoint> {
    let (module, attribute) = parse_reference(&config.app_module)?;

    let source = module_source(&config.app_root, &module).ok_or_else(|| {
        Error::Configuration(format!(
            "entrypoint not found: module '{}' does not exist under {}",
            module,
            config.app_root.display()
        ))
    })?;

    tracing::debug!("Resolved entrypoint {}:{} to {:?}", module, attribute, source);

    Ok(ServiceEntrypoint {
        module,
        attribute,
        source,
    })
}

fn parse_reference(reference: &str) -> Result<(String, String)> {
    let reference = reference.trim();
    let (module, attribute) = match reference.split_once(':') {
        Some((module, attribute)) => (module.trim(), attribute.trim()),
        None => (reference, DEFAULT_ATTRIBUTE),
    };

    let valid_identifier = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    if module.is_empty() || !module.split('.').all(valid_identifier) {
        return Err(Error::Configuration(format!(
            "entrypoint not found: invalid module in '{}'",
            reference
        )));
    }
    if !valid_identifier(attribute) {
        return Err(Error::Configuration(format!(
            "entrypoint not found: invalid attribute in '{}'",
            reference
        )));
    }

    Ok((module.to_string(), attribute.to_string()))
}

/// `a.b` resolves to `<root>/a/b.py` or the package `<root>/a/b/__init__.py`
fn module_source(root: &Path, module: &str) -> Option<PathBuf> {
    let relative: PathBuf = module.split('.').collect();

    let file = root.join(&relative).with_extension("py");
    if file.is_file() {
        return Some(file);
    }

    let package = root.join(&relative).join("__init__.py");
    package.is_file().then_some(package)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(root: &Path, app_module: &str) -> SupervisorConfig {
        let root = root.to_str().unwrap().to_string();
        let app_module = app_module.to_string();
        SupervisorConfig::from_lookup(move |key| match key {
            crate::config::ENV_APP_ROOT => Some(root.clone()),
            crate::config::ENV_APP_MODULE => Some(app_module.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_locates_module_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("app.py"), "app = None\n").unwrap();

        let entry = locate_service_entrypoint(&config_for(root.path(), "app:app")).unwrap();
        assert_eq!(entry.reference(), "app:app");
        assert_eq!(entry.source, root.path().join("app.py"));
    }

    #[test]
    fn test_locates_nested_package() {
        let root = tempfile::tempdir().unwrap();
        let pkg = root.path().join("cca/web");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("__init__.py"), "").unwrap();

        let entry = locate_service_entrypoint(&config_for(root.path(), "cca.web")).unwrap();
        assert_eq!(entry.module, "cca.web");
        assert_eq!(entry.attribute, "app");
        assert_eq!(entry.to_string(), "cca.web:app");
    }

    #[test]
    fn test_missing_module_is_configuration_error() {
        let root = tempfile::tempdir().unwrap();

        let err = locate_service_entrypoint(&config_for(root.path(), "app:app")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("entrypoint not found"));
    }

    #[test]
    fn test_malformed_references_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        for reference in ["../app:app", "app:", "app.:app", "9app:app", "app:a-b"] {
            let err = locate_service_entrypoint(&config_for(root.path(), reference)).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{}", reference);
        }
    }
}
