use std::{collections::HashMap, env};

use crate::errors::{Error, Result};

pub const ENV_S3_BUCKET: &str = "S3BUCKET";
pub const ENV_PROFILE: &str = "AWS_DEFAULT_PROFILE";
pub const ENV_OWNER: &str = "OWNER";
pub const ENV_PRODUCT: &str = "PRODUCT";

/// Variables required to manage stacks.
pub const STACK_ENV_VARS: [&str; 4] = [ENV_S3_BUCKET, ENV_PROFILE, ENV_OWNER, ENV_PRODUCT];

/// Variables required to locate the per-owner stacks (e.g., SSH script generation).
pub const PREFIX_ENV_VARS: [&str; 2] = [ENV_OWNER, ENV_PROFILE];

/// Returns the expected environment variables that are not set, in the given order.
pub fn missing_env_vars(expected: &[&str]) -> Vec<String> {
    missing_from(expected, |k| env::var_os(k).is_some())
}

/// Same as "missing_env_vars" but checks existence with the given lookup.
pub fn missing_from<F>(expected: &[&str], exists: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    log::debug!("BEGIN validate env vars {:?}", expected);
    let missing: Vec<String> = expected
        .iter()
        .filter(|k| !exists(**k))
        .map(|k| k.to_string())
        .collect();
    log::debug!("END validate env vars (missing {:?})", missing);
    missing
}

/// Loads the values of the expected environment variables.
/// Fails with the full list of variables that are not set.
pub fn load_env_vars(expected: &[&str]) -> Result<HashMap<String, String>> {
    let missing = missing_env_vars(expected);
    if !missing.is_empty() {
        return Err(Error::other(format!(
            "missing environment variables: {:?}",
            missing
        )));
    }

    let mut vars = HashMap::new();
    for k in expected {
        let v = env::var(k)
            .map_err(|e| Error::other(format!("failed to read environment variable {k} ({e})")))?;
        vars.insert(k.to_string(), v);
    }
    Ok(vars)
}

/// Represents the account-wide settings read from the environment.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    pub owner: String,
    /// AWS profile name, also used as the environment name (e.g., "dev", "prod").
    pub profile: String,
    pub product: String,
    pub s3_bucket: String,
}

impl Settings {
    /// Loads all stack settings, requiring every variable in "STACK_ENV_VARS".
    pub fn from_env() -> Result<Self> {
        let mut vars = load_env_vars(&STACK_ENV_VARS)?;
        Ok(Self {
            owner: vars.remove(ENV_OWNER).unwrap_or_default(),
            profile: vars.remove(ENV_PROFILE).unwrap_or_default(),
            product: vars.remove(ENV_PRODUCT).unwrap_or_default(),
            s3_bucket: vars.remove(ENV_S3_BUCKET).unwrap_or_default(),
        })
    }

    pub fn stack_prefix(&self) -> String {
        stack_prefix(&self.owner, &self.profile)
    }

    pub fn stack_name(&self, stack_type: &str) -> String {
        stack_name(&self.stack_prefix(), stack_type)
    }

    pub fn template_url(&self, region: &str, stack_type: &str) -> String {
        template_url(&self.s3_bucket, region, stack_type)
    }
}

/// Loads "{OWNER}-{AWS_DEFAULT_PROFILE}" from the environment.
pub fn stack_prefix_from_env() -> Result<String> {
    let vars = load_env_vars(&PREFIX_ENV_VARS)?;
    Ok(stack_prefix(&vars[ENV_OWNER], &vars[ENV_PROFILE]))
}

/// Returns the prefix shared by every stack (and key pair) of an owner and environment.
pub fn stack_prefix(owner: &str, profile: &str) -> String {
    format!("{owner}-{profile}")
}

pub fn stack_name(prefix: &str, stack_type: &str) -> String {
    format!("{prefix}-{stack_type}")
}

/// Returns the S3 object key of the stack template.
pub fn template_key(stack_type: &str) -> String {
    format!("cloudformation/{stack_type}.yaml")
}

/// Returns the S3 URL of the stack template.
pub fn template_url(s3_bucket: &str, region: &str, stack_type: &str) -> String {
    format!(
        "https://s3-{region}.amazonaws.com/{s3_bucket}/{}",
        template_key(stack_type)
    )
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- settings::test_missing_from --exact --show-output
#[test]
fn test_missing_from() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let present = ["OWNER", "PRODUCT"];
    let missing = missing_from(&STACK_ENV_VARS, |k| present.contains(&k));
    assert_eq!(
        missing,
        vec![String::from("S3BUCKET"), String::from("AWS_DEFAULT_PROFILE")]
    );

    let missing = missing_from(&PREFIX_ENV_VARS, |_| true);
    assert!(missing.is_empty());
}

#[test]
fn test_load_env_vars_reports_all_missing() {
    let res = load_env_vars(&[
        "AWS_OPS_TEST_UNSET_VAR_A_7f3c",
        "AWS_OPS_TEST_UNSET_VAR_B_7f3c",
    ]);
    let msg = res.unwrap_err().message();
    assert!(msg.contains("AWS_OPS_TEST_UNSET_VAR_A_7f3c"));
    assert!(msg.contains("AWS_OPS_TEST_UNSET_VAR_B_7f3c"));
}

#[test]
fn test_names() {
    let s = Settings {
        owner: String::from("alice"),
        profile: String::from("dev"),
        product: String::from("analytics"),
        s3_bucket: String::from("alice-home"),
    };
    assert_eq!(s.stack_prefix(), "alice-dev");
    assert_eq!(s.stack_name("vpc"), "alice-dev-vpc");
    assert_eq!(
        s.template_url("us-west-2", "rs"),
        "https://s3-us-west-2.amazonaws.com/alice-home/cloudformation/rs.yaml"
    );
    assert_eq!(template_key("sg"), "cloudformation/sg.yaml");
}
