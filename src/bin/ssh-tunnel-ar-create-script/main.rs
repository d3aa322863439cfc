use std::{io, path::PathBuf};

use aws_ops::{cloudformation, logging, settings, tunnel};
use clap::{crate_version, value_parser, Arg, ArgAction, Command};

const APP_NAME: &str = "ssh-tunnel-ar-create-script";

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Creates the shell script 'ssh_tunnel_ar.sh' that tunnels localhost:3306 to Aurora through the bastion host")
        .after_help("requires environment variables OWNER, AWS_DEFAULT_PROFILE")
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .help("Increases output detail (-v this script, -vv everything)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("OUTPUT_DIR")
                .long("output-dir")
                .help("Directory to write the script to")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .default_value("."),
        )
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = command().get_matches();

    let verbose = matches.get_count("VERBOSE");
    logging::init(&logging::script_filter(module_path!(), verbose));
    log::info!("{APP_NAME} version is: {}", crate_version!());

    let output_dir = matches
        .get_one::<PathBuf>("OUTPUT_DIR")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    if let Err(e) = execute(output_dir).await {
        log::error!("FAILED: script {APP_NAME} ({e})");
        return Err(e);
    }
    Ok(())
}

async fn execute(output_dir: PathBuf) -> io::Result<()> {
    let prefix = settings::stack_prefix_from_env()?;
    let profile = std::env::var(settings::ENV_PROFILE).ok();
    let shared_config = aws_ops::load_config(None, profile).await;
    let cfn_manager = cloudformation::Manager::new(&shared_config);

    let public_ip = cfn_manager
        .fetch_output(
            &settings::stack_name(&prefix, "ec2"),
            tunnel::OUTPUT_BASTION_PUBLIC_IP,
        )
        .await?;
    log::info!("bastion public ip is: {public_ip}");

    // TODO: wait for the Aurora cluster to be available, as the Redshift script does
    let endpoint = cfn_manager
        .fetch_output(
            &settings::stack_name(&prefix, "ar"),
            tunnel::OUTPUT_AURORA_ENDPOINT,
        )
        .await?;
    log::info!("aurora endpoint is: {endpoint}");

    let contents = tunnel::aurora_script(&public_ip, &prefix, &endpoint);
    tunnel::write_script(&output_dir, tunnel::AURORA_SCRIPT, &contents)?;

    Ok(())
}

#[test]
fn test_command() {
    command().debug_assert();

    let m = command()
        .try_get_matches_from([APP_NAME, "-v", "--output-dir", "/tmp"])
        .unwrap();
    assert_eq!(m.get_count("VERBOSE"), 1);
    assert_eq!(
        m.get_one::<PathBuf>("OUTPUT_DIR").unwrap(),
        &PathBuf::from("/tmp")
    );
}
