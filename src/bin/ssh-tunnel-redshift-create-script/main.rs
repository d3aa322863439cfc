use std::{io, path::PathBuf};

use aws_ops::{cloudformation, ec2, logging, redshift, settings, tunnel};
use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use tokio::time::Duration;

const APP_NAME: &str = "ssh-tunnel-redshift-create-script";

#[derive(Debug)]
struct Options {
    cluster_id: Option<String>,
    instance_id: Option<String>,
    output_dir: PathBuf,
    timeout: Duration,
    interval: Duration,
}

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Creates the shell script 'ssh_tunnel_rs.sh' that tunnels localhost:5439 to Redshift through the bastion host")
        .after_help("requires environment variables OWNER, AWS_DEFAULT_PROFILE")
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .help("Increases output detail (-v this script, -vv everything)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("CLUSTER_IDENTIFIER")
                .long("cluster-identifier")
                .help("Waits for this Redshift cluster to be available and reads its endpoint, instead of the '{prefix}-rs' stack outputs")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("INSTANCE_ID")
                .long("instance-id")
                .help("Reads the bastion public IP from this EC2 instance instead of the '{prefix}-ec2' stack outputs")
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
        .arg(
            Arg::new("TIMEOUT_SECONDS")
                .long("timeout-seconds")
                .help("Sets the maximum wait for the cluster to be available")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("1800"),
        )
        .arg(
            Arg::new("INTERVAL_SECONDS")
                .long("interval-seconds")
                .help("Sets the cluster status polling interval")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64).range(1..))
                .default_value("60"),
        )
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = command().get_matches();

    let verbose = matches.get_count("VERBOSE");
    logging::init(&logging::script_filter(module_path!(), verbose));
    log::info!("{APP_NAME} version is: {}", crate_version!());

    let opts = Options {
        cluster_id: matches.get_one::<String>("CLUSTER_IDENTIFIER").cloned(),
        instance_id: matches.get_one::<String>("INSTANCE_ID").cloned(),
        output_dir: matches
            .get_one::<PathBuf>("OUTPUT_DIR")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(".")),
        timeout: matches
            .get_one::<u64>("TIMEOUT_SECONDS")
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(redshift::DEFAULT_POLL_TIMEOUT),
        interval: matches
            .get_one::<u64>("INTERVAL_SECONDS")
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(redshift::DEFAULT_POLL_INTERVAL),
    };

    if let Err(e) = execute(opts).await {
        log::error!("FAILED: script {APP_NAME} ({e})");
        return Err(e);
    }
    Ok(())
}

async fn execute(opts: Options) -> io::Result<()> {
    log::debug!("options are: {:?}", opts);

    let prefix = settings::stack_prefix_from_env()?;
    let profile = std::env::var(settings::ENV_PROFILE).ok();
    let shared_config = aws_ops::load_config(None, profile).await;
    let cfn_manager = cloudformation::Manager::new(&shared_config);

    let public_ip = match &opts.instance_id {
        Some(id) => {
            let ec2_manager = ec2::Manager::new(&shared_config);
            ec2_manager.fetch_public_ip(id).await?
        }
        None => {
            cfn_manager
                .fetch_output(
                    &settings::stack_name(&prefix, "ec2"),
                    tunnel::OUTPUT_BASTION_PUBLIC_IP,
                )
                .await?
        }
    };
    log::info!("bastion public ip is: {public_ip}");

    let endpoint = match &opts.cluster_id {
        Some(id) => {
            let redshift_manager = redshift::Manager::new(&shared_config);
            redshift_manager
                .fetch_endpoint(id, opts.timeout, opts.interval)
                .await?
        }
        None => {
            cfn_manager
                .fetch_output(
                    &settings::stack_name(&prefix, "rs"),
                    tunnel::OUTPUT_REDSHIFT_ENDPOINT,
                )
                .await?
        }
    };
    log::info!("redshift endpoint is: {endpoint}");

    let contents = tunnel::redshift_script(&public_ip, &prefix, &endpoint);
    tunnel::write_script(&opts.output_dir, tunnel::REDSHIFT_SCRIPT, &contents)?;

    Ok(())
}

#[test]
fn test_command() {
    command().debug_assert();

    let m = command()
        .try_get_matches_from([APP_NAME, "--cluster-identifier", "redshift-id"])
        .unwrap();
    assert_eq!(
        m.get_one::<String>("CLUSTER_IDENTIFIER").unwrap(),
        "redshift-id"
    );
    assert_eq!(*m.get_one::<u64>("TIMEOUT_SECONDS").unwrap(), 1800);
    assert_eq!(*m.get_one::<u64>("INTERVAL_SECONDS").unwrap(), 60);

    assert!(command()
        .try_get_matches_from([APP_NAME, "--interval-seconds", "0"])
        .is_err());
}
