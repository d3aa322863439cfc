pub mod params;

use std::collections::HashMap;

use crate::errors::{self, Error, Result};
use aws_sdk_cloudformation::{
    error::SdkError,
    operation::{
        delete_stack::DeleteStackError, describe_stacks::DescribeStacksError,
        update_stack::UpdateStackError,
    },
    types::{Capability, OnFailure, Output, Parameter, StackStatus, Tag},
    Client,
};
use aws_types::SdkConfig as AwsSdkConfig;
use tokio::time::{sleep, Duration, Instant};

/// Implements AWS CloudFormation manager.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    pub cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        Self {
            region: crate::region_of(shared_config),
            cli: Client::new(shared_config),
        }
    }

    /// Creates a CloudFormation stack from the template stored in S3.
    /// The separate caller is expected to poll the status asynchronously.
    pub async fn create_stack(
        &self,
        stack_name: &str,
        template_url: &str,
        capabilities: Option<Vec<Capability>>,
        on_failure: OnFailure,
        tags: Option<Vec<Tag>>,
        parameters: Option<Vec<Parameter>>,
    ) -> Result<Stack> {
        log::info!("creating stack '{stack_name}' from '{template_url}'");
        let ret = self
            .cli
            .create_stack()
            .stack_name(stack_name)
            .template_url(template_url)
            .set_capabilities(capabilities)
            .on_failure(on_failure)
            .set_tags(tags)
            .set_parameters(parameters)
            .send()
            .await;
        let resp = match ret {
            Ok(v) => v,
            Err(e) => {
                return Err(Error::API {
                    message: format!("failed create_stack {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                });
            }
        };

        let stack_id = resp.stack_id().unwrap_or_default();
        log::info!("created stack '{stack_name}' with '{stack_id}'");
        Ok(Stack::new(
            stack_name,
            stack_id,
            StackStatus::CreateInProgress,
            None,
        ))
    }

    /// Updates a CloudFormation stack with the template stored in S3.
    /// If there is nothing to update, it returns "UpdateComplete" with "no_op" set,
    /// so the caller does not need to poll.
    pub async fn update_stack(
        &self,
        stack_name: &str,
        template_url: &str,
        capabilities: Option<Vec<Capability>>,
        tags: Option<Vec<Tag>>,
        parameters: Option<Vec<Parameter>>,
    ) -> Result<Stack> {
        log::info!("updating stack '{stack_name}' from '{template_url}'");
        let ret = self
            .cli
            .update_stack()
            .stack_name(stack_name)
            .template_url(template_url)
            .set_capabilities(capabilities)
            .set_tags(tags)
            .set_parameters(parameters)
            .send()
            .await;
        let resp = match ret {
            Ok(v) => v,
            Err(e) => {
                if is_err_no_updates_update_stack(&e) {
                    log::warn!("stack '{stack_name}' has no updates to be performed");
                    let mut stack =
                        Stack::new(stack_name, "", StackStatus::UpdateComplete, None);
                    stack.no_op = true;
                    return Ok(stack);
                }
                return Err(Error::API {
                    message: format!("failed update_stack {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                });
            }
        };

        let stack_id = resp.stack_id().unwrap_or_default();
        log::info!("updating stack '{stack_name}' with '{stack_id}'");
        Ok(Stack::new(
            stack_name,
            stack_id,
            StackStatus::UpdateInProgress,
            None,
        ))
    }

    /// Deletes a CloudFormation stack.
    /// The separate caller is expected to poll the status asynchronously.
    pub async fn delete_stack(&self, stack_name: &str) -> Result<Stack> {
        log::info!("deleting stack '{stack_name}'");
        let ret = self.cli.delete_stack().stack_name(stack_name).send().await;
        match ret {
            Ok(_) => {}
            Err(e) => {
                if !is_err_does_not_exist_delete_stack(&e) {
                    return Err(Error::API {
                        message: format!("failed delete_stack {:?}", e),
                        retryable: errors::is_sdk_err_retryable(&e),
                    });
                }
                log::warn!("stack already deleted so returning DeleteComplete status (original error '{}')", e);
                return Ok(Stack::new(
                    stack_name,
                    "",
                    StackStatus::DeleteComplete,
                    None,
                ));
            }
        };

        Ok(Stack::new(
            stack_name,
            "",
            StackStatus::DeleteInProgress,
            None,
        ))
    }

    /// Polls CloudFormation stack status.
    pub async fn poll_stack(
        &self,
        stack_name: &str,
        desired_status: StackStatus,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Stack> {
        log::info!(
            "polling stack '{}' with desired status {:?} for timeout {:?} and interval {:?}",
            stack_name,
            desired_status,
            timeout,
            interval,
        );

        let start = Instant::now();
        let mut cnt: u128 = 0;
        loop {
            let elapsed = start.elapsed();
            if elapsed.ge(&timeout) {
                break;
            }

            let itv = {
                if cnt == 0 {
                    // first poll with no wait
                    Duration::from_secs(1)
                } else {
                    interval
                }
            };
            sleep(itv).await;

            let ret = self
                .cli
                .describe_stacks()
                .stack_name(stack_name)
                .send()
                .await;
            let resp = match ret {
                Ok(v) => v,
                Err(e) => {
                    // CFN should fail for non-existing stack, instead of returning 0 stack
                    if is_err_does_not_exist_describe_stacks(&e)
                        && desired_status.eq(&StackStatus::DeleteComplete)
                    {
                        log::info!("stack already deleted as desired");
                        return Ok(Stack::new(stack_name, "", desired_status, None));
                    }
                    return Err(Error::API {
                        message: format!("failed describe_stacks {:?}", e),
                        retryable: errors::is_sdk_err_retryable(&e),
                    });
                }
            };
            let stacks = resp.stacks();
            if stacks.len() != 1 {
                // CFN should fail for non-existing stack, instead of returning 0 stack
                return Err(Error::other(format!(
                    "failed to find stack '{stack_name}' (found {})",
                    stacks.len()
                )));
            }

            let stack = &stacks[0];
            let current_id = stack.stack_id().unwrap_or_default();
            let current_stack_status = match stack.stack_status() {
                Some(s) => s.clone(),
                None => {
                    return Err(Error::other(format!(
                        "stack '{stack_name}' has no status"
                    )));
                }
            };
            log::info!(
                "poll (current stack status {:?}, elapsed {:?})",
                current_stack_status,
                elapsed
            );

            if check_status(&desired_status, &current_stack_status).map_err(|e| {
                match stack.stack_status_reason() {
                    Some(reason) => Error::other(format!("{} (reason '{reason}')", e.message())),
                    None => e,
                }
            })? {
                let outputs = if stack.outputs().is_empty() {
                    None
                } else {
                    Some(Vec::from(stack.outputs()))
                };
                return Ok(Stack::new(
                    stack_name,
                    current_id,
                    current_stack_status,
                    outputs,
                ));
            }

            cnt += 1;
        }

        Err(Error::Other {
            message: format!("failed to poll stack {} in time", stack_name),
            retryable: true,
        })
    }

    /// Fetches the outputs of the stack, keyed by the output key.
    pub async fn describe_outputs(&self, stack_name: &str) -> Result<HashMap<String, String>> {
        log::debug!("START describe outputs of stack '{stack_name}'");
        let ret = self
            .cli
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;
        let resp = match ret {
            Ok(v) => v,
            Err(e) => {
                return Err(Error::API {
                    message: format!("failed describe_stacks {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                });
            }
        };

        let stack = match resp.stacks().first() {
            Some(s) => s,
            None => {
                return Err(Error::other(format!("failed to find stack '{stack_name}'")));
            }
        };
        let outputs = outputs_to_map(stack.outputs());
        log::debug!("END describe outputs of stack '{stack_name}' ({} outputs)", outputs.len());
        Ok(outputs)
    }

    /// Fetches a single output value of the stack.
    pub async fn fetch_output(&self, stack_name: &str, output_key: &str) -> Result<String> {
        let outputs = self.describe_outputs(stack_name).await?;
        output_value(&outputs, stack_name, output_key)
    }

    /// Lists all exports in the region, keyed by the export name.
    pub async fn list_exports(&self) -> Result<HashMap<String, String>> {
        log::info!("listing exports in the region {}", self.region);

        let mut exports = HashMap::new();
        let mut token: Option<String> = None;
        loop {
            let ret = self
                .cli
                .list_exports()
                .set_next_token(token.clone())
                .send()
                .await;
            let resp = match ret {
                Ok(v) => v,
                Err(e) => {
                    return Err(Error::API {
                        message: format!("failed list_exports {:?}", e),
                        retryable: errors::is_sdk_err_retryable(&e),
                    });
                }
            };

            for export in resp.exports() {
                if let (Some(name), Some(value)) = (export.name(), export.value()) {
                    exports.insert(name.to_string(), value.to_string());
                }
            }

            token = resp.next_token().map(String::from);
            if token.is_none() {
                break;
            }
        }

        log::debug!("listed {} exports", exports.len());
        Ok(exports)
    }
}

/// Represents the CloudFormation stack.
#[derive(Debug)]
pub struct Stack {
    pub name: String,
    pub id: String,
    pub status: StackStatus,
    pub outputs: Option<Vec<Output>>,
    /// True if the requested update had nothing to change.
    pub no_op: bool,
}

impl Stack {
    pub fn new(name: &str, id: &str, status: StackStatus, outputs: Option<Vec<Output>>) -> Self {
        // ref. <https://doc.rust-lang.org/1.0.0/style/ownership/constructors.html>
        Self {
            name: String::from(name),
            id: String::from(id),
            status,
            outputs,
            no_op: false,
        }
    }
}

/// Returns "Ok(true)" if the current status is the desired one,
/// "Ok(false)" if polling should continue, and an error if the stack
/// reached a terminal status that can never become the desired one.
pub fn check_status(desired: &StackStatus, current: &StackStatus) -> Result<bool> {
    if current.eq(desired) {
        return Ok(true);
    }

    let failed = |msg: &str| -> Result<bool> { Err(Error::other(msg)) };
    match desired {
        StackStatus::CreateComplete => match current {
            StackStatus::CreateFailed => failed("stack create failed"),
            StackStatus::RollbackInProgress | StackStatus::RollbackComplete | StackStatus::RollbackFailed => {
                failed("stack create failed, rolled back")
            }
            StackStatus::DeleteInProgress => failed("stack create failed, being deleted"),
            StackStatus::DeleteComplete => failed("stack create failed, already deleted"),
            _ => Ok(false),
        },
        StackStatus::UpdateComplete => match current {
            StackStatus::UpdateFailed => failed("stack update failed"),
            StackStatus::UpdateRollbackInProgress
            | StackStatus::UpdateRollbackCompleteCleanupInProgress
            | StackStatus::UpdateRollbackComplete
            | StackStatus::UpdateRollbackFailed => failed("stack update failed, rolled back"),
            StackStatus::DeleteInProgress => failed("stack update failed, being deleted"),
            StackStatus::DeleteComplete => failed("stack update failed, already deleted"),
            _ => Ok(false),
        },
        StackStatus::DeleteComplete => match current {
            StackStatus::DeleteFailed => failed("stack delete failed"),
            _ => Ok(false),
        },
        _ => Ok(false),
    }
}

/// Converts the stack outputs to a map of output key to output value.
pub fn outputs_to_map(outputs: &[Output]) -> HashMap<String, String> {
    outputs
        .iter()
        .filter_map(|o| match (o.output_key(), o.output_value()) {
            (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
            _ => None,
        })
        .collect()
}

/// Looks up an output value, failing with the stack and key names.
pub fn output_value(
    outputs: &HashMap<String, String>,
    stack_name: &str,
    output_key: &str,
) -> Result<String> {
    match outputs.get(output_key) {
        Some(v) => Ok(v.clone()),
        None => Err(Error::other(format!(
            "stack '{stack_name}' has no output '{output_key}' (found {:?})",
            outputs.keys().collect::<Vec<_>>()
        ))),
    }
}

#[inline]
fn is_err_does_not_exist_delete_stack(e: &SdkError<DeleteStackError>) -> bool {
    match e {
        SdkError::ServiceError(err) => {
            let msg = format!("{:?}", err.err());
            msg.contains("does not exist")
        }
        _ => false,
    }
}

#[inline]
fn is_err_does_not_exist_describe_stacks(e: &SdkError<DescribeStacksError>) -> bool {
    match e {
        SdkError::ServiceError(err) => {
            let msg = format!("{:?}", err.err());
            msg.contains("does not exist")
        }
        _ => false,
    }
}

#[inline]
fn is_err_no_updates_update_stack(e: &SdkError<UpdateStackError>) -> bool {
    match e {
        SdkError::ServiceError(err) => {
            let msg = format!("{:?}", err.err());
            msg.contains("No updates are to be performed")
        }
        _ => false,
    }
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- cloudformation::test_check_status --exact --show-output
#[test]
fn test_check_status() {
    assert!(check_status(&StackStatus::CreateComplete, &StackStatus::CreateComplete).unwrap());
    assert!(!check_status(&StackStatus::CreateComplete, &StackStatus::CreateInProgress).unwrap());
    assert!(check_status(&StackStatus::CreateComplete, &StackStatus::CreateFailed).is_err());
    assert!(check_status(&StackStatus::CreateComplete, &StackStatus::RollbackComplete).is_err());
    assert!(check_status(&StackStatus::CreateComplete, &StackStatus::DeleteInProgress).is_err());

    assert!(check_status(&StackStatus::UpdateComplete, &StackStatus::UpdateComplete).unwrap());
    assert!(!check_status(&StackStatus::UpdateComplete, &StackStatus::UpdateInProgress).unwrap());
    assert!(!check_status(
        &StackStatus::UpdateComplete,
        &StackStatus::UpdateCompleteCleanupInProgress
    )
    .unwrap());
    assert!(check_status(&StackStatus::UpdateComplete, &StackStatus::UpdateRollbackComplete).is_err());
    assert!(check_status(&StackStatus::UpdateComplete, &StackStatus::DeleteComplete).is_err());

    assert!(check_status(&StackStatus::DeleteComplete, &StackStatus::DeleteComplete).unwrap());
    assert!(!check_status(&StackStatus::DeleteComplete, &StackStatus::DeleteInProgress).unwrap());
    let e = check_status(&StackStatus::DeleteComplete, &StackStatus::DeleteFailed).unwrap_err();
    assert_eq!(e.message(), "stack delete failed");
    assert!(!e.retryable());
}

#[test]
fn test_outputs() {
    let outputs = vec![
        Output::builder()
            .output_key("PublicIP")
            .output_value("203.0.113.10")
            .build(),
        Output::builder()
            .output_key("InstanceId")
            .output_value("i-0123456789abcdef0")
            .build(),
        // dropped, no value
        Output::builder().output_key("Empty").build(),
    ];
    let m = outputs_to_map(&outputs);
    assert_eq!(m.len(), 2);
    assert_eq!(
        output_value(&m, "alice-dev-ec2", "PublicIP").unwrap(),
        "203.0.113.10"
    );

    let e = output_value(&m, "alice-dev-ec2", "EndPointAddress").unwrap_err();
    assert!(e.message().contains("alice-dev-ec2"));
    assert!(e.message().contains("EndPointAddress"));
}

#[cfg(test)]
fn validation_error(message: &str) -> aws_smithy_types::error::ErrorMetadata {
    aws_smithy_types::error::ErrorMetadata::builder()
        .code("ValidationError")
        .message(message)
        .build()
}

/// RUST_LOG=debug cargo test --package aws-ops --lib -- cloudformation::test_is_err_no_updates_update_stack --exact --show-output
#[test]
fn test_is_err_no_updates_update_stack() {
    let e = SdkError::service_error(
        UpdateStackError::generic(validation_error("No updates are to be performed.")),
        errors::test_http_response(400),
    );
    assert!(is_err_no_updates_update_stack(&e));

    let e = SdkError::service_error(
        UpdateStackError::generic(validation_error(
            "Stack:alice-dev-vpc is in UPDATE_IN_PROGRESS state and can not be updated.",
        )),
        errors::test_http_response(400),
    );
    assert!(!is_err_no_updates_update_stack(&e));

    let e: SdkError<UpdateStackError> = SdkError::timeout_error("timed out");
    assert!(!is_err_no_updates_update_stack(&e));
}

#[test]
fn test_is_err_does_not_exist() {
    let e = SdkError::service_error(
        DescribeStacksError::generic(validation_error("Stack with id alice-dev-vpc does not exist")),
        errors::test_http_response(400),
    );
    assert!(is_err_does_not_exist_describe_stacks(&e));

    let e = SdkError::service_error(
        DescribeStacksError::generic(validation_error("1 validation error detected")),
        errors::test_http_response(400),
    );
    assert!(!is_err_does_not_exist_describe_stacks(&e));

    let e = SdkError::service_error(
        DeleteStackError::generic(validation_error("Stack with id alice-dev-vpc does not exist")),
        errors::test_http_response(400),
    );
    assert!(is_err_does_not_exist_delete_stack(&e));

    let e = SdkError::service_error(
        DeleteStackError::generic(validation_error("Stack alice-dev-vpc is termination protected")),
        errors::test_http_response(400),
    );
    assert!(!is_err_does_not_exist_delete_stack(&e));
}

#[tokio::test]
async fn test_poll_stack_timeout_is_retryable() {
    let shared_config = crate::load_config(Some(String::from("us-west-2")), None).await;
    let manager = Manager::new(&shared_config);

    let ret = manager
        .poll_stack(
            "alice-dev-vpc",
            StackStatus::CreateComplete,
            Duration::ZERO,
            Duration::from_secs(30),
        )
        .await;
    match ret {
        Err(Error::Other { message, retryable }) => {
            assert!(retryable);
            assert!(message.contains("alice-dev-vpc"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}
