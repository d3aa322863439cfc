use std::{collections::HashMap, fs, path::Path};

use crate::errors::{Error, Result};
use minijinja::Environment;
use serde_yaml::{Mapping, Value};

/// Renders "{{Name}}" placeholders in the file with the given variables.
/// Undefined variables render as empty strings.
pub fn render_file(path: &Path, vars: &HashMap<String, String>) -> Result<String> {
    let source = fs::read_to_string(path).map_err(|e| {
        Error::other(format!("failed to read template {} ({e})", path.display()))
    })?;
    render_str(&source, vars)
        .map_err(|e| Error::other(format!("failed to render template {} ({e})", path.display())))
}

/// Renders "{{Name}}" placeholders in the string with the given variables.
pub fn render_str(source: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.render_str(source, vars)
        .map_err(|e| Error::other(format!("failed to render ({e})")))
}

/// Reads a parameter file: renders it as a template, then parses the YAML.
/// An empty document is an empty mapping.
/// Only plain "{{Name}}" placeholders are supported; Mustache triple braces,
/// "{{&Name}}" and sections ("{{#Name}}...{{/Name}}") fail to render.
pub fn read_config(path: &Path, vars: &HashMap<String, String>) -> Result<Mapping> {
    log::info!("configuration file is: {}", path.display());

    let rendered = render_file(path, vars)?;
    log::debug!("post template process yaml is: {rendered}");

    let value: Value = serde_yaml::from_str(&rendered)
        .map_err(|e| Error::other(format!("failed to parse {} ({e})", path.display())))?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(m) => Ok(m),
        other => Err(Error::other(format!(
            "configuration file {} must be a YAML mapping (found {:?})",
            path.display(),
            other
        ))),
    }
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- template::test_read_config --exact --show-output
#[test]
fn test_read_config() {
    use std::io::Write;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(
        f,
        "BucketName: {{{{Owner}}}}-{{{{Environment}}}}-logs\nHome: s3://{{{{S3BucketHome}}}}/\nMissing: x{{{{Nope}}}}y\nPort: 5439\n"
    )
    .unwrap();

    let vars = HashMap::from([
        (String::from("Environment"), String::from("dev")),
        (String::from("Owner"), String::from("alice")),
        (String::from("S3BucketHome"), String::from("alice-home")),
    ]);
    let cfg = read_config(f.path(), &vars).unwrap();
    assert_eq!(
        cfg.get("BucketName").and_then(Value::as_str),
        Some("alice-dev-logs")
    );
    assert_eq!(cfg.get("Home").and_then(Value::as_str), Some("s3://alice-home/"));
    assert_eq!(cfg.get("Missing").and_then(Value::as_str), Some("xy"));
    assert_eq!(cfg.get("Port").and_then(Value::as_u64), Some(5439));
}

#[test]
fn test_read_config_empty_and_invalid() {
    use std::io::Write;

    let f = tempfile::NamedTempFile::new().unwrap();
    let cfg = read_config(f.path(), &HashMap::new()).unwrap();
    assert!(cfg.is_empty());

    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "- a\n- b\n").unwrap();
    assert!(read_config(f.path(), &HashMap::new()).is_err());
}

#[test]
fn test_render_str_keeps_trailing_newline() {
    let vars = HashMap::from([(String::from("Owner"), String::from("bob"))]);
    assert_eq!(render_str("owner: {{Owner}}\n", &vars).unwrap(), "owner: bob\n");
}

#[test]
fn test_render_str_rejects_mustache_only_forms() {
    let vars = HashMap::from([(String::from("Owner"), String::from("bob"))]);
    assert!(render_str("owner: {{&Owner}}\n", &vars).is_err());
    assert!(render_str("{{#Owner}}x{{/Owner}}\n", &vars).is_err());
}
