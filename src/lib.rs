pub mod errors;
pub mod logging;
pub mod settings;
pub mod template;
pub mod tunnel;

#[cfg(feature = "cloudformation")]
pub mod cloudformation;

#[cfg(feature = "ec2")]
pub mod ec2;

#[cfg(feature = "redshift")]
pub mod redshift;

#[cfg(feature = "s3")]
pub mod s3;

use aws_config::{self, meta::region::RegionProviderChain, BehaviorVersion};
use aws_types::{region::Region, SdkConfig as AwsSdkConfig};

/// Region used when neither the environment nor the profile names one.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Loads an AWS config from default environments.
/// If "profile_name" is none, the SDK default profile resolution applies.
pub async fn load_config(region: Option<String>, profile_name: Option<String>) -> AwsSdkConfig {
    log::info!("loading config for the region {:?}", region);

    let reg_provider = RegionProviderChain::first_try(region.map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let mut cfg = aws_config::defaults(BehaviorVersion::latest()).region(reg_provider);
    if let Some(p) = profile_name {
        log::info!("loading the aws profile '{p}'");
        cfg = cfg.profile_name(p);
    }

    cfg.load().await
}

/// Returns the region name of the loaded config, falling back to the default region.
pub fn region_of(shared_config: &AwsSdkConfig) -> String {
    shared_config
        .region()
        .map(|r| r.to_string())
        .unwrap_or_else(|| String::from(DEFAULT_REGION))
}
