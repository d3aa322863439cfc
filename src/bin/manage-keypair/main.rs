use std::{io, path::PathBuf};

use aws_ops::{
    ec2::{self, pem},
    logging,
};
use clap::{crate_version, value_parser, Arg, ArgAction, ArgGroup, Command};

const APP_NAME: &str = "manage-keypair";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Action {
    Create,
    Delete,
    Rotate,
}

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Creates, deletes, or rotates an EC2 key pair and its '~/.ssh/{keypair}.pem' file")
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .help("Increases output detail (-v this script, -vv everything)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("KEYPAIR")
                .long("keypair")
                .short('k')
                .help("Name of the EC2 key pair")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("CREATE")
                .long("create")
                .short('c')
                .help("Creates the key pair and writes the private key")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("DELETE")
                .long("delete")
                .short('d')
                .help("Deletes the key pair and the private key file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ROTATE")
                .long("rotate")
                .short('r')
                .help("Deletes then recreates the key pair")
                .action(ArgAction::SetTrue),
        )
        .group(
            ArgGroup::new("ACTION")
                .args(["CREATE", "DELETE", "ROTATE"])
                .required(true)
                .multiple(false),
        )
        .arg(
            Arg::new("SSH_DIR")
                .long("ssh-dir")
                .help("Directory of the private key file (default '~/.ssh')")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(PathBuf)),
        )
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = command().get_matches();

    let verbose = matches.get_count("VERBOSE");
    logging::init(&logging::script_filter(module_path!(), verbose));
    log::info!("{APP_NAME} version is: {}", crate_version!());

    let key_name = matches
        .get_one::<String>("KEYPAIR")
        .cloned()
        .unwrap_or_default();
    let action = if matches.get_flag("CREATE") {
        Action::Create
    } else if matches.get_flag("DELETE") {
        Action::Delete
    } else {
        Action::Rotate
    };
    let ssh_dir = matches.get_one::<PathBuf>("SSH_DIR").cloned();

    if let Err(e) = execute(&key_name, action, ssh_dir).await {
        log::error!("FAILED: script {APP_NAME} ({e})");
        return Err(e);
    }
    Ok(())
}

async fn execute(key_name: &str, action: Action, ssh_dir: Option<PathBuf>) -> io::Result<()> {
    log::debug!("key pair '{key_name}', action {:?}", action);

    let ssh_dir = match ssh_dir {
        Some(d) => d,
        None => pem::default_ssh_dir()?,
    };
    let pem_path = pem::pem_path(&ssh_dir, key_name);

    // honors AWS_DEFAULT_PROFILE when set
    let profile = std::env::var(aws_ops::settings::ENV_PROFILE).ok();
    let shared_config = aws_ops::load_config(None, profile).await;
    let manager = ec2::Manager::new(&shared_config);

    match action {
        Action::Create => {
            let key_pair = manager.create_key_pair(key_name).await?;
            log::debug!("create returned: {:?}", key_pair);
            pem::write_pem(&pem_path, &key_pair.material)?;
        }
        Action::Delete => {
            manager.delete_key_pair(key_name).await?;
            pem::remove_pem(&pem_path)?;
        }
        Action::Rotate => {
            manager.delete_key_pair(key_name).await?;
            pem::remove_pem(&pem_path)?;
            let key_pair = manager.create_key_pair(key_name).await?;
            log::debug!("create returned: {:?}", key_pair);
            pem::write_pem(&pem_path, &key_pair.material)?;
        }
    }

    Ok(())
}

#[test]
fn test_command() {
    command().debug_assert();

    let m = command()
        .try_get_matches_from(["manage-keypair", "-v", "-k", "alice-dev", "-r"])
        .unwrap();
    assert_eq!(m.get_count("VERBOSE"), 1);
    assert_eq!(m.get_one::<String>("KEYPAIR").unwrap(), "alice-dev");
    assert!(m.get_flag("ROTATE"));
    assert!(m.get_one::<PathBuf>("SSH_DIR").is_none());

    assert!(command()
        .try_get_matches_from(["manage-keypair", "-k", "alice-dev", "-c", "-r"])
        .is_err());
    assert!(command()
        .try_get_matches_from(["manage-keypair", "-c"])
        .is_err());
}
