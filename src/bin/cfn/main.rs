use std::{
    io,
    path::{Path, PathBuf},
};

use aws_ops::{
    cloudformation::{self, params},
    logging, s3, settings,
};
use aws_sdk_cloudformation::types::StackStatus;
use clap::{crate_version, value_parser, Arg, ArgAction, ArgGroup, Command};
use tokio::time::Duration;

const APP_NAME: &str = "cfn";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Action {
    Create,
    Update,
    Delete,
}

#[derive(Debug)]
struct Options {
    stack_type: String,
    action: Action,
    config_dir: PathBuf,
    template_file: Option<PathBuf>,
    wait: bool,
    timeout: Duration,
    interval: Duration,
}

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Creates, updates, or deletes a CloudFormation stack from a template in S3")
        .after_help(
            "one and only one of --create, --delete, --update required\n\n\
             requires environment variables S3BUCKET, AWS_DEFAULT_PROFILE, OWNER, PRODUCT\n\n\
             stack types: vpc, sg (security group), role, ar (aurora), rs (redshift), mysql, ec2",
        )
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .help("Increases output detail (-v this script, -vv stack management, -vvv everything)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("TYPE_OF_STACK")
                .long("type_of_stack")
                .visible_alias("type-of-stack")
                .short('t')
                .help("REQUIRED: type of stack, for example vpc")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("CREATE")
                .long("create")
                .short('c')
                .help("Creates the stack")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("DELETE")
                .long("delete")
                .short('d')
                .help("Deletes the stack")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("UPDATE")
                .long("update")
                .short('u')
                .help("Updates the stack")
                .action(ArgAction::SetTrue),
        )
        .group(
            ArgGroup::new("ACTION")
                .args(["CREATE", "DELETE", "UPDATE"])
                .required(true)
                .multiple(false),
        )
        .arg(
            Arg::new("CONFIG_DIR")
                .long("config-dir")
                .help("Directory of the '{type}_cfg.yaml' parameter files")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .default_value("etc"),
        )
        .arg(
            Arg::new("TEMPLATE_FILE")
                .long("template-file")
                .help("Uploads this local template to 's3://$S3BUCKET/cloudformation/{type}.yaml' first")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("NO_WAIT")
                .long("no-wait")
                .help("Returns without waiting for the stack operation to complete")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("TIMEOUT_SECONDS")
                .long("timeout-seconds")
                .help("Sets the maximum wait for the stack operation")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("3600"),
        )
        .arg(
            Arg::new("INTERVAL_SECONDS")
                .long("interval-seconds")
                .help("Sets the stack status polling interval")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64).range(1..))
                .default_value("30"),
        )
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = command().get_matches();

    let verbose = matches.get_count("VERBOSE");
    logging::init(&logging::stack_filter(module_path!(), verbose));
    log::info!("{APP_NAME} version is: {}", crate_version!());

    let action = if matches.get_flag("CREATE") {
        Action::Create
    } else if matches.get_flag("UPDATE") {
        Action::Update
    } else {
        Action::Delete
    };
    let opts = Options {
        stack_type: matches
            .get_one::<String>("TYPE_OF_STACK")
            .cloned()
            .unwrap_or_default(),
        action,
        config_dir: matches
            .get_one::<PathBuf>("CONFIG_DIR")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("etc")),
        template_file: matches.get_one::<PathBuf>("TEMPLATE_FILE").cloned(),
        wait: !matches.get_flag("NO_WAIT"),
        timeout: Duration::from_secs(*matches.get_one::<u64>("TIMEOUT_SECONDS").unwrap_or(&3600)),
        interval: Duration::from_secs(*matches.get_one::<u64>("INTERVAL_SECONDS").unwrap_or(&30)),
    };

    if let Err(e) = execute(opts).await {
        log::error!("FAILED: script {APP_NAME} ({e})");
        return Err(e);
    }
    Ok(())
}

async fn execute(opts: Options) -> io::Result<()> {
    log::debug!("options are: {:?}", opts);

    let s = settings::Settings::from_env()?;

    let shared_config = aws_ops::load_config(None, Some(s.profile.clone())).await;
    let region = aws_ops::region_of(&shared_config);

    let secrets_dir = params::default_secrets_dir();
    let stack_params = params::load(
        &s,
        &opts.stack_type,
        &region,
        &opts.config_dir,
        secrets_dir.as_deref(),
    )?;

    if let Some(template_file) = &opts.template_file {
        if opts.action == Action::Delete {
            log::warn!("ignoring --template-file for delete");
        } else {
            upload_template(&shared_config, template_file, &s.s3_bucket, &opts.stack_type).await?;
        }
    }

    let manager = cloudformation::Manager::new(&shared_config);
    let (stack, desired) = match opts.action {
        Action::Create => (
            manager
                .create_stack(
                    &stack_params.name,
                    &stack_params.template_url,
                    stack_params.sdk_capabilities(),
                    stack_params.on_failure.clone(),
                    stack_params.sdk_tags()?,
                    stack_params.sdk_parameters(),
                )
                .await?,
            StackStatus::CreateComplete,
        ),
        Action::Update => (
            manager
                .update_stack(
                    &stack_params.name,
                    &stack_params.template_url,
                    stack_params.sdk_capabilities(),
                    stack_params.sdk_tags()?,
                    stack_params.sdk_parameters(),
                )
                .await?,
            StackStatus::UpdateComplete,
        ),
        Action::Delete => (
            manager.delete_stack(&stack_params.name).await?,
            StackStatus::DeleteComplete,
        ),
    };
    log::debug!("{:?}", stack);

    if stack.status == desired {
        log::info!("stack '{}' is already {:?}", stack.name, desired);
        return Ok(());
    }
    if !opts.wait {
        log::info!("not waiting for stack '{}' ({:?})", stack.name, stack.status);
        return Ok(());
    }

    let stack = manager
        .poll_stack(&stack.name, desired, opts.timeout, opts.interval)
        .await?;
    log::info!("stack '{}' is {:?}", stack.name, stack.status);
    if let Some(outputs) = &stack.outputs {
        for o in outputs {
            log::info!(
                "output {} = {}",
                o.output_key().unwrap_or_default(),
                o.output_value().unwrap_or_default()
            );
        }
    }

    Ok(())
}

async fn upload_template(
    shared_config: &aws_types::SdkConfig,
    template_file: &Path,
    s3_bucket: &str,
    stack_type: &str,
) -> io::Result<()> {
    let s3_manager = s3::Manager::new(shared_config);
    s3_manager
        .put_object(template_file, s3_bucket, &settings::template_key(stack_type))
        .await?;
    Ok(())
}

#[test]
fn test_command() {
    command().debug_assert();

    let m = command()
        .try_get_matches_from(["cfn", "-vv", "-t", "vpc", "-c"])
        .unwrap();
    assert_eq!(m.get_count("VERBOSE"), 2);
    assert_eq!(m.get_one::<String>("TYPE_OF_STACK").unwrap(), "vpc");
    assert!(m.get_flag("CREATE"));
    assert!(!m.get_flag("UPDATE"));
    assert_eq!(m.get_one::<PathBuf>("CONFIG_DIR").unwrap(), &PathBuf::from("etc"));

    // one and only one action
    assert!(command()
        .try_get_matches_from(["cfn", "-t", "vpc", "-c", "-d"])
        .is_err());
    assert!(command().try_get_matches_from(["cfn", "-t", "vpc"]).is_err());
    // type is required
    assert!(command().try_get_matches_from(["cfn", "-u"]).is_err());

    // a zero interval would poll without pause
    assert!(command()
        .try_get_matches_from(["cfn", "-t", "vpc", "-c", "--interval-seconds", "0"])
        .is_err());
    let m = command()
        .try_get_matches_from(["cfn", "-t", "vpc", "-c", "--interval-seconds", "5"])
        .unwrap();
    assert_eq!(*m.get_one::<u64>("INTERVAL_SECONDS").unwrap(), 5);
}
