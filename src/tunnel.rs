use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use crate::errors::{Error, Result};

/// Login user of the bastion host AMI.
pub const BASTION_USER: &str = "ec2-user";

/// Mode of the generated scripts (owner/group writable, world executable).
pub const SCRIPT_MODE: u32 = 0o775;

pub const BASTION_SCRIPT: &str = "ssh_ec2.sh";
pub const AURORA_SCRIPT: &str = "ssh_tunnel_ar.sh";
pub const REDSHIFT_SCRIPT: &str = "ssh_tunnel_rs.sh";

pub const AURORA_PORT: u16 = 3306;
pub const REDSHIFT_PORT: u16 = 5439;

/// Stack output holding the bastion host public IP.
pub const OUTPUT_BASTION_PUBLIC_IP: &str = "PublicIP";
/// Stack output holding the Aurora cluster address (host only).
pub const OUTPUT_AURORA_ENDPOINT: &str = "EndPointAddress";
/// Stack output holding the Redshift cluster endpoint ("host:port").
pub const OUTPUT_REDSHIFT_ENDPOINT: &str = "ClusterEndpoint";

/// Renders the script that logs into the bastion host.
/// "key_name" is the key pair whose private key is "~/.ssh/{key_name}.pem".
pub fn bastion_script(public_ip: &str, key_name: &str) -> String {
    format!(
        "#!/bin/sh \nssh {BASTION_USER}@{public_ip} \\\n\t-i ~/.ssh/{key_name}.pem \n"
    )
}

/// Renders the script that opens a background tunnel from "localhost:{local_port}"
/// to "target" ("host:port") through the bastion host.
pub fn tunnel_script(public_ip: &str, key_name: &str, local_port: u16, target: &str) -> String {
    format!(
        "#!/bin/sh \nssh -f {BASTION_USER}@{public_ip} \\\n\t-i ~/.ssh/{key_name}.pem \\\n\t-L localhost:{local_port}:{target} \\\n\t-o \"ExitOnForwardFailure yes\" -o \"ServerAliveInterval 60\" \\\n\t-N"
    )
}

/// Renders the Aurora tunnel script; Aurora listens on the same port as the local end.
pub fn aurora_script(public_ip: &str, key_name: &str, endpoint_address: &str) -> String {
    tunnel_script(
        public_ip,
        key_name,
        AURORA_PORT,
        &format!("{endpoint_address}:{AURORA_PORT}"),
    )
}

/// Renders the Redshift tunnel script; "endpoint" is already in "host:port" form.
pub fn redshift_script(public_ip: &str, key_name: &str, endpoint: &str) -> String {
    tunnel_script(public_ip, key_name, REDSHIFT_PORT, endpoint)
}

/// Writes the script to "dir/file_name" and sets "SCRIPT_MODE".
/// Returns the written path.
pub fn write_script(dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    log::info!("writing script '{}'", path.display());
    log::debug!("script contents:\n{contents}");

    fs::write(&path, contents)
        .map_err(|e| Error::other(format!("failed to write {} ({e})", path.display())))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(SCRIPT_MODE)).map_err(|e| {
        Error::other(format!(
            "failed to set permissions on {} ({e})",
            path.display()
        ))
    })?;

    Ok(path)
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- tunnel::test_bastion_script --exact --show-output
#[test]
fn test_bastion_script() {
    assert_eq!(
        bastion_script("203.0.113.10", "alice-dev"),
        "#!/bin/sh \nssh ec2-user@203.0.113.10 \\\n\t-i ~/.ssh/alice-dev.pem \n"
    );
}

#[test]
fn test_tunnel_scripts() {
    let ar = aurora_script("203.0.113.10", "alice-dev", "db.cluster-abc.us-west-2.rds.amazonaws.com");
    assert_eq!(
        ar,
        "#!/bin/sh \n\
         ssh -f ec2-user@203.0.113.10 \\\n\
         \t-i ~/.ssh/alice-dev.pem \\\n\
         \t-L localhost:3306:db.cluster-abc.us-west-2.rds.amazonaws.com:3306 \\\n\
         \t-o \"ExitOnForwardFailure yes\" -o \"ServerAliveInterval 60\" \\\n\
         \t-N"
    );

    let rs = redshift_script("203.0.113.10", "alice-dev", "rs.abc.us-west-2.redshift.amazonaws.com:5439");
    assert!(rs.contains("\t-L localhost:5439:rs.abc.us-west-2.redshift.amazonaws.com:5439 \\\n"));
    assert!(rs.starts_with("#!/bin/sh \nssh -f ec2-user@203.0.113.10 \\\n"));
    assert!(rs.ends_with("\t-N"));
}

#[test]
fn test_write_script() {
    let dir = tempfile::tempdir().unwrap();

    let p = write_script(dir.path(), BASTION_SCRIPT, "#!/bin/sh \n").unwrap();
    assert_eq!(p, dir.path().join(BASTION_SCRIPT));
    assert_eq!(fs::read_to_string(&p).unwrap(), "#!/bin/sh \n");
    let mode = fs::metadata(&p).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, SCRIPT_MODE);

    // overwrites the previous script
    let p = write_script(dir.path(), BASTION_SCRIPT, "#!/bin/sh \necho\n").unwrap();
    assert_eq!(fs::read_to_string(&p).unwrap(), "#!/bin/sh \necho\n");
}
