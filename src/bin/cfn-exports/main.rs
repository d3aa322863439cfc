use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use aws_ops::{cloudformation, logging, settings};
use clap::{crate_version, Arg, ArgAction, Command};

const APP_NAME: &str = "cfn-exports";

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Prints all CloudFormation exports in the region as 'Name=Value', sorted by name")
        .arg(
            Arg::new("VERBOSE")
                .long("verbose")
                .short('v')
                .help("Increases output detail (-v this script, -vv everything)")
                .action(ArgAction::Count),
        )
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = command().get_matches();

    let verbose = matches.get_count("VERBOSE");
    logging::init(&logging::script_filter(module_path!(), verbose));
    log::info!("{APP_NAME} version is: {}", crate_version!());

    if let Err(e) = execute().await {
        log::error!("FAILED: script {APP_NAME} ({e})");
        return Err(e);
    }
    Ok(())
}

async fn execute() -> io::Result<()> {
    let profile = std::env::var(settings::ENV_PROFILE).ok();
    let shared_config = aws_ops::load_config(None, profile).await;
    let cfn_manager = cloudformation::Manager::new(&shared_config);

    let exports: BTreeMap<String, String> = cfn_manager.list_exports().await?.into_iter().collect();

    let mut stdout = io::stdout().lock();
    stdout.write_all(format_exports(&exports).as_bytes())?;
    stdout.flush()
}

fn format_exports(exports: &BTreeMap<String, String>) -> String {
    exports
        .iter()
        .map(|(k, v)| format!("{k}={v}\n"))
        .collect()
}

#[test]
fn test_format_exports() {
    let exports = BTreeMap::from([
        (String::from("alice-dev-vpc-VpcId"), String::from("vpc-0abc")),
        (String::from("alice-dev-sg-BastionSg"), String::from("sg-0def")),
    ]);
    assert_eq!(
        format_exports(&exports),
        "alice-dev-sg-BastionSg=sg-0def\nalice-dev-vpc-VpcId=vpc-0abc\n"
    );
    assert_eq!(format_exports(&BTreeMap::new()), "");
}
