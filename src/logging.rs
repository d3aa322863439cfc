use std::{env, io::Write};

/// Target of this library's log records.
const LIB_TARGET: &str = "aws_ops";

/// Target of the stack-management module, which has its own verbosity step.
const STACK_TARGET: &str = "aws_ops::cloudformation";

/// Parameter merging sits under the stack-management module but belongs to the script.
const PARAMS_TARGET: &str = "aws_ops::cloudformation::params";

/// Returns the log filter for the key-pair and SSH script binaries.
///
/// 0: info everywhere
/// 1: debug for the binary and this library
/// 2 or more: debug everywhere (including the AWS SDK crates)
pub fn script_filter(bin_target: &str, verbose: u8) -> String {
    match verbose {
        0 => String::from("info"),
        1 => format!("info,{bin_target}=debug,{LIB_TARGET}=debug"),
        _ => String::from("debug"),
    }
}

/// Returns the log filter for the stack-management binary.
///
/// 0: info everywhere
/// 1: debug for the binary and this library, except stack management
/// 2: debug for stack management as well
/// 3 or more: debug everywhere (including the AWS SDK crates)
pub fn stack_filter(bin_target: &str, verbose: u8) -> String {
    match verbose {
        0 => String::from("info"),
        1 => format!(
            "info,{bin_target}=debug,{LIB_TARGET}=debug,{STACK_TARGET}=info,{PARAMS_TARGET}=debug"
        ),
        2 => format!("info,{bin_target}=debug,{LIB_TARGET}=debug"),
        _ => String::from("debug"),
    }
}

/// Initializes the global logger.
/// "RUST_LOG" takes precedence over the given filter.
/// Each record is printed as "<timestamp> <message>".
pub fn init(filter: &str) {
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, filter),
    )
    .format(|buf, record| writeln!(buf, "{} {}", buf.timestamp(), record.args()))
    .init();

    let effective = effective_filter(filter, env::var(env_logger::DEFAULT_FILTER_ENV).ok());
    log::debug!("log filter is: {effective}");
}

/// Returns the filter env_logger actually applies: "RUST_LOG" wins whenever it is set.
pub fn effective_filter(filter: &str, rust_log: Option<String>) -> String {
    rust_log.unwrap_or_else(|| filter.to_string())
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- logging::test_script_filter --exact --show-output
#[test]
fn test_script_filter() {
    assert_eq!(script_filter("manage_keypair", 0), "info");
    assert_eq!(
        script_filter("manage_keypair", 1),
        "info,manage_keypair=debug,aws_ops=debug"
    );
    assert_eq!(script_filter("manage_keypair", 2), "debug");
    assert_eq!(script_filter("manage_keypair", 7), "debug");
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- logging::test_stack_filter --exact --show-output
#[test]
fn test_stack_filter() {
    assert_eq!(stack_filter("cfn", 0), "info");

    let f = stack_filter("cfn", 1);
    assert!(f.contains("cfn=debug"));
    assert!(f.contains("aws_ops::cloudformation=info"));
    // parameter merging stays visible at the first level
    assert!(f.ends_with("aws_ops::cloudformation::params=debug"));

    let f = stack_filter("cfn", 2);
    assert!(f.contains("aws_ops=debug"));
    assert!(!f.contains("aws_ops::cloudformation"));

    assert_eq!(stack_filter("cfn", 3), "debug");
}

#[test]
fn test_effective_filter() {
    assert_eq!(effective_filter("info", None), "info");
    assert_eq!(
        effective_filter("info", Some(String::from("aws_ops=trace"))),
        "aws_ops=trace"
    );
}
