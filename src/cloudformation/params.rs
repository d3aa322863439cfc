use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use crate::{
    errors::{Error, Result},
    settings::Settings,
    template,
};
use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, Tag};
use serde_yaml::{Mapping, Value};

pub const KEY_NAME: &str = "name";
pub const KEY_TEMPLATE_URL: &str = "template_url";
pub const KEY_CAPABILITIES: &str = "capabilities";
pub const KEY_ON_FAILURE: &str = "on_failure";
pub const KEY_TAGS: &str = "tags";

/// Parameters that are also applied as stack tags.
pub const TAGGED_PARAMETERS: [&str; 3] = ["Environment", "Owner", "Product"];

const DEFAULT_CAPABILITIES: [&str; 2] = ["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"];

/// Returns "~/.aws/etc", where per-stack secrets files live.
pub fn default_secrets_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".aws").join("etc"))
}

/// Returns the parameter file name for the stack type.
pub fn config_file_name(stack_type: &str) -> String {
    format!("{stack_type}_cfg.yaml")
}

/// Variables available to "{{Name}}" placeholders in parameter files.
pub fn render_vars(settings: &Settings) -> HashMap<String, String> {
    HashMap::from([
        (String::from("Environment"), settings.profile.clone()),
        (String::from("Owner"), settings.owner.clone()),
        (String::from("S3BucketHome"), settings.s3_bucket.clone()),
    ])
}

/// Returns the parameters every stack starts with.
pub fn base_params(settings: &Settings, stack_name: &str, template_url: &str) -> Mapping {
    let mut m = Mapping::new();
    m.insert(KEY_NAME.into(), stack_name.into());
    m.insert(KEY_TEMPLATE_URL.into(), template_url.into());
    m.insert("Environment".into(), settings.profile.as_str().into());
    m.insert("Owner".into(), settings.owner.as_str().into());
    m.insert("Product".into(), settings.product.as_str().into());
    m
}

/// Overwrites the keys in "into" with the ones in "from".
pub fn merge(into: &mut Mapping, from: Mapping) {
    for (k, v) in from {
        into.insert(k, v);
    }
}

/// Builds the stack parameters: base parameters, then the parameter file in
/// "config_dir", then the secrets file in "secrets_dir". Later files win.
/// Missing files are skipped.
pub fn load(
    settings: &Settings,
    stack_type: &str,
    region: &str,
    config_dir: &Path,
    secrets_dir: Option<&Path>,
) -> Result<StackParams> {
    let stack_name = settings.stack_name(stack_type);
    let template_url = settings.template_url(region, stack_type);
    log::info!("stack name is: {stack_name}");

    let mut merged = base_params(settings, &stack_name, &template_url);
    let vars = render_vars(settings);

    let file_name = config_file_name(stack_type);
    let mut files = vec![config_dir.join(&file_name)];
    if let Some(d) = secrets_dir {
        files.push(d.join(&file_name));
    }
    for f in files {
        if !f.is_file() {
            log::debug!("skipping non-existent configuration file {}", f.display());
            continue;
        }
        let cfg = template::read_config(&f, &vars)?;
        log::debug!("configuration file dict is: {:?}", cfg);
        merge(&mut merged, cfg);
    }

    let params = StackParams::from_mapping(&merged)?;
    log::debug!("parameters are: {:?}", params);
    Ok(params)
}

/// Represents everything needed to create or update a stack.
#[derive(Debug, Clone)]
pub struct StackParams {
    pub name: String,
    pub template_url: String,
    pub capabilities: Vec<Capability>,
    pub on_failure: OnFailure,
    pub tags: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

impl StackParams {
    /// Splits the merged mapping into reserved keys and template parameters.
    pub fn from_mapping(m: &Mapping) -> Result<Self> {
        let mut name = None;
        let mut template_url = None;
        let mut capabilities: Vec<Capability> = DEFAULT_CAPABILITIES
            .iter()
            .map(|c| Capability::from(*c))
            .collect();
        let mut on_failure = OnFailure::Rollback;
        let mut extra_tags = BTreeMap::new();
        let mut parameters = BTreeMap::new();

        for (k, v) in m {
            let key = match k.as_str() {
                Some(s) => s,
                None => {
                    return Err(Error::other(format!("parameter key {:?} is not a string", k)));
                }
            };
            match key {
                KEY_NAME => name = Some(scalar_to_string(key, v)?),
                KEY_TEMPLATE_URL => template_url = Some(scalar_to_string(key, v)?),
                KEY_CAPABILITIES => {
                    capabilities = to_strings(key, v)?
                        .iter()
                        .map(|c| Capability::from(c.as_str()))
                        .collect();
                }
                KEY_ON_FAILURE => on_failure = parse_on_failure(&scalar_to_string(key, v)?)?,
                KEY_TAGS => {
                    let tm = match v {
                        Value::Mapping(tm) => tm,
                        Value::Null => continue,
                        _ => {
                            return Err(Error::other(format!(
                                "'{KEY_TAGS}' must be a mapping (found {:?})",
                                v
                            )));
                        }
                    };
                    for (tk, tv) in tm {
                        let tk = scalar_to_string(KEY_TAGS, tk)?;
                        let tv = scalar_to_string(&tk, tv)?;
                        extra_tags.insert(tk, tv);
                    }
                }
                _ => {
                    parameters.insert(key.to_string(), parameter_value(key, v)?);
                }
            }
        }

        let name = name.ok_or_else(|| Error::other("stack name is not set"))?;
        let template_url =
            template_url.ok_or_else(|| Error::other("stack template url is not set"))?;

        let mut tags = BTreeMap::new();
        for k in TAGGED_PARAMETERS {
            if let Some(v) = parameters.get(k) {
                tags.insert(k.to_string(), v.clone());
            }
        }
        tags.extend(extra_tags);

        Ok(Self {
            name,
            template_url,
            capabilities,
            on_failure,
            tags,
            parameters,
        })
    }

    pub fn sdk_parameters(&self) -> Option<Vec<Parameter>> {
        if self.parameters.is_empty() {
            return None;
        }
        Some(
            self.parameters
                .iter()
                .map(|(k, v)| {
                    Parameter::builder()
                        .parameter_key(k)
                        .parameter_value(v)
                        .build()
                })
                .collect(),
        )
    }

    pub fn sdk_tags(&self) -> Result<Option<Vec<Tag>>> {
        if self.tags.is_empty() {
            return Ok(None);
        }
        let mut tags = Vec::with_capacity(self.tags.len());
        for (k, v) in &self.tags {
            let tag = Tag::builder()
                .key(k)
                .value(v)
                .build()
                .map_err(|e| Error::other(format!("failed to build tag '{k}' ({e})")))?;
            tags.push(tag);
        }
        Ok(Some(tags))
    }

    pub fn sdk_capabilities(&self) -> Option<Vec<Capability>> {
        if self.capabilities.is_empty() {
            None
        } else {
            Some(self.capabilities.clone())
        }
    }
}

fn parse_on_failure(s: &str) -> Result<OnFailure> {
    match s.to_uppercase().as_str() {
        "ROLLBACK" => Ok(OnFailure::Rollback),
        "DELETE" => Ok(OnFailure::Delete),
        "DO_NOTHING" => Ok(OnFailure::DoNothing),
        other => Err(Error::other(format!(
            "'{KEY_ON_FAILURE}' must be one of ROLLBACK, DELETE, DO_NOTHING (found '{other}')"
        ))),
    }
}

fn scalar_to_string(key: &str, v: &Value) -> Result<String> {
    match v {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(Error::other(format!(
            "'{key}' must be a scalar value (found {:?})",
            v
        ))),
    }
}

fn to_strings(key: &str, v: &Value) -> Result<Vec<String>> {
    match v {
        Value::Sequence(seq) => seq.iter().map(|x| scalar_to_string(key, x)).collect(),
        _ => Ok(vec![scalar_to_string(key, v)?]),
    }
}

/// Lists become "CommaDelimitedList" values.
fn parameter_value(key: &str, v: &Value) -> Result<String> {
    Ok(to_strings(key, v)?.join(","))
}

#[cfg(test)]
fn test_settings() -> Settings {
    Settings {
        owner: String::from("alice"),
        profile: String::from("dev"),
        product: String::from("analytics"),
        s3_bucket: String::from("alice-home"),
    }
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- cloudformation::params::test_load --exact --show-output
#[test]
fn test_load() {
    use std::fs;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let config_dir = tempfile::tempdir().unwrap();
    let secrets_dir = tempfile::tempdir().unwrap();
    fs::write(
        config_dir.path().join("rs_cfg.yaml"),
        "NodeType: dc2.large\nNumberOfNodes: 2\nMasterUsername: placeholder\nSubnets:\n  - subnet-a\n  - subnet-b\nLogBucket: '{{Owner}}-{{Environment}}-logs'\ntags:\n  CostCenter: 42\n",
    )
    .unwrap();
    fs::write(
        secrets_dir.path().join("rs_cfg.yaml"),
        "MasterUsername: admin\nMasterUserPassword: s3cr3t\n",
    )
    .unwrap();

    let s = test_settings();
    let p = load(&s, "rs", "us-west-2", config_dir.path(), Some(secrets_dir.path())).unwrap();
    assert_eq!(p.name, "alice-dev-rs");
    assert_eq!(
        p.template_url,
        "https://s3-us-west-2.amazonaws.com/alice-home/cloudformation/rs.yaml"
    );
    assert_eq!(p.on_failure, OnFailure::Rollback);
    assert_eq!(p.capabilities.len(), 2);

    assert_eq!(p.parameters["Environment"], "dev");
    assert_eq!(p.parameters["Owner"], "alice");
    assert_eq!(p.parameters["Product"], "analytics");
    assert_eq!(p.parameters["NodeType"], "dc2.large");
    assert_eq!(p.parameters["NumberOfNodes"], "2");
    assert_eq!(p.parameters["Subnets"], "subnet-a,subnet-b");
    assert_eq!(p.parameters["LogBucket"], "alice-dev-logs");
    // secrets override the shared file
    assert_eq!(p.parameters["MasterUsername"], "admin");
    assert_eq!(p.parameters["MasterUserPassword"], "s3cr3t");
    assert!(!p.parameters.contains_key(KEY_NAME));
    assert!(!p.parameters.contains_key(KEY_TAGS));

    assert_eq!(p.tags["Environment"], "dev");
    assert_eq!(p.tags["Owner"], "alice");
    assert_eq!(p.tags["Product"], "analytics");
    assert_eq!(p.tags["CostCenter"], "42");
    assert_eq!(p.sdk_tags().unwrap().unwrap().len(), 4);
    assert_eq!(p.sdk_parameters().unwrap().len(), p.parameters.len());
}

#[test]
fn test_load_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let s = test_settings();
    let p = load(&s, "vpc", "us-east-1", dir.path(), None).unwrap();
    assert_eq!(p.name, "alice-dev-vpc");
    assert_eq!(p.parameters.len(), 3);
    assert_eq!(p.tags.len(), 3);
}

#[test]
fn test_from_mapping_reserved_keys() {
    let s = test_settings();
    let mut m = base_params(&s, "alice-dev-role", "https://example.com/role.yaml");

    let mut overrides = Mapping::new();
    overrides.insert("name".into(), "custom-role".into());
    overrides.insert("on_failure".into(), "delete".into());
    overrides.insert("capabilities".into(), "CAPABILITY_NAMED_IAM".into());
    merge(&mut m, overrides);

    let p = StackParams::from_mapping(&m).unwrap();
    assert_eq!(p.name, "custom-role");
    assert_eq!(p.on_failure, OnFailure::Delete);
    assert_eq!(p.capabilities, vec![Capability::CapabilityNamedIam]);

    let mut bad = m.clone();
    bad.insert("on_failure".into(), "explode".into());
    assert!(StackParams::from_mapping(&bad).is_err());

    let mut bad = m.clone();
    let mut nested = Mapping::new();
    nested.insert("a".into(), "b".into());
    bad.insert("Nested".into(), Value::Mapping(nested));
    assert!(StackParams::from_mapping(&bad).is_err());

    let mut no_name = m;
    no_name.remove("name");
    assert!(StackParams::from_mapping(&no_name).is_err());
}
