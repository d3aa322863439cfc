use std::{io, path::PathBuf};

use aws_ops::{cloudformation, ec2, logging, settings, tunnel};
use clap::{crate_version, value_parser, Arg, ArgAction, Command};

const APP_NAME: &str = "ssh-ec2-create-script";

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Creates the shell script 'ssh_ec2.sh' that logs into the bastion host")
        .after_help("requires environment variables OWNER, AWS_DEFAULT_PROFILE")
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .help("Increases output detail (-v this script, -vv everything)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("INSTANCE_ID")
                .long("instance-id")
                .help("Reads the public IP from this EC2 instance instead of the '{prefix}-ec2' stack outputs")
                .required(false)
                .num_args(1),
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

    let instance_id = matches.get_one::<String>("INSTANCE_ID").cloned();
    let output_dir = matches
        .get_one::<PathBuf>("OUTPUT_DIR")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    if let Err(e) = execute(instance_id, output_dir).await {
        log::error!("FAILED: script {APP_NAME} ({e})");
        return Err(e);
    }
    Ok(())
}

async fn execute(instance_id: Option<String>, output_dir: PathBuf) -> io::Result<()> {
    let prefix = settings::stack_prefix_from_env()?;
    let profile = std::env::var(settings::ENV_PROFILE).ok();
    let shared_config = aws_ops::load_config(None, profile).await;

    let public_ip = match instance_id {
        Some(id) => {
            let ec2_manager = ec2::Manager::new(&shared_config);
            ec2_manager.fetch_public_ip(&id).await?
        }
        None => {
            let cfn_manager = cloudformation::Manager::new(&shared_config);
            cfn_manager
                .fetch_output(
                    &settings::stack_name(&prefix, "ec2"),
                    tunnel::OUTPUT_BASTION_PUBLIC_IP,
                )
                .await?
        }
    };
    log::info!("bastion public ip is: {public_ip}");

    let contents = tunnel::bastion_script(&public_ip, &prefix);
    tunnel::write_script(&output_dir, tunnel::BASTION_SCRIPT, &contents)?;

    Ok(())
}

#[test]
fn test_command() {
    command().debug_assert();

    let m = command()
        .try_get_matches_from([APP_NAME, "--instance-id", "i-0123456789abcdef0"])
        .unwrap();
    assert_eq!(
        m.get_one::<String>("INSTANCE_ID").unwrap(),
        "i-0123456789abcdef0"
    );
    assert_eq!(m.get_one::<PathBuf>("OUTPUT_DIR").unwrap(), &PathBuf::from("."));
}
