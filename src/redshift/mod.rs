use crate::errors::{self, Error, Result};
use aws_sdk_redshift::{types::Cluster, Client};
use aws_types::SdkConfig as AwsSdkConfig;
use tokio::time::{sleep, Duration, Instant};

/// Cluster status once it accepts connections.
pub const STATUS_AVAILABLE: &str = "available";
/// Cluster status from which "available" is never reached.
pub const STATUS_DELETING: &str = "deleting";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Implements AWS Redshift manager.
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

    /// Describes the cluster.
    pub async fn describe_cluster(&self, cluster_id: &str) -> Result<Cluster> {
        let ret = self
            .cli
            .describe_clusters()
            .cluster_identifier(cluster_id)
            .send()
            .await;
        let resp = match ret {
            Ok(v) => v,
            Err(e) => {
                return Err(Error::API {
                    message: format!("failed describe_clusters {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                });
            }
        };

        match resp.clusters().first() {
            Some(c) => Ok(c.clone()),
            None => Err(Error::other(format!(
                "failed to find cluster '{cluster_id}'"
            ))),
        }
    }

    /// Polls the cluster until it is available.
    /// Fails as soon as the cluster is being deleted.
    pub async fn poll_cluster_available(
        &self,
        cluster_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Cluster> {
        log::info!(
            "polling cluster '{}' until available for timeout {:?} and interval {:?}",
            cluster_id,
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

            let cluster = self.describe_cluster(cluster_id).await?;
            let status = cluster.cluster_status().unwrap_or_default();
            log::info!(
                "poll (current cluster status {:?}, elapsed {:?})",
                status,
                elapsed
            );
            if check_cluster_status(status)? {
                return Ok(cluster);
            }

            cnt += 1;
        }

        Err(Error::Other {
            message: format!("failed to poll cluster {} in time", cluster_id),
            retryable: true,
        })
    }

    /// Waits for the cluster to be available and returns its endpoint in "host:port" format.
    pub async fn fetch_endpoint(
        &self,
        cluster_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<String> {
        log::debug!("START fetch endpoint of cluster '{cluster_id}'");
        let cluster = self
            .poll_cluster_available(cluster_id, timeout, interval)
            .await?;
        let endpoint = endpoint_of(&cluster, cluster_id)?;
        log::debug!("END fetch endpoint of cluster '{cluster_id}' ({endpoint})");
        Ok(endpoint)
    }
}

/// Returns "Ok(true)" once available, "Ok(false)" to keep polling.
pub fn check_cluster_status(status: &str) -> Result<bool> {
    match status {
        STATUS_AVAILABLE => Ok(true),
        STATUS_DELETING => Err(Error::other("cluster is being deleted")),
        _ => Ok(false),
    }
}

/// Formats the cluster endpoint as "host:port".
pub fn endpoint_of(cluster: &Cluster, cluster_id: &str) -> Result<String> {
    let endpoint = match cluster.endpoint() {
        Some(ep) => ep,
        None => {
            return Err(Error::other(format!(
                "cluster '{cluster_id}' has no endpoint"
            )));
        }
    };
    match (endpoint.address(), endpoint.port()) {
        (Some(address), Some(port)) => Ok(format!("{address}:{port}")),
        _ => Err(Error::other(format!(
            "cluster '{cluster_id}' has an incomplete endpoint {:?}",
            endpoint
        ))),
    }
}

#[test]
fn test_check_cluster_status() {
    assert!(check_cluster_status("available").unwrap());
    assert!(!check_cluster_status("creating").unwrap());
    assert!(!check_cluster_status("modifying").unwrap());
    assert!(check_cluster_status("deleting").is_err());
}

#[test]
fn test_endpoint_of() {
    use aws_sdk_redshift::types::Endpoint;

    let cluster = Cluster::builder()
        .cluster_identifier("redshift-id")
        .cluster_status("available")
        .endpoint(
            Endpoint::builder()
                .address("redshift-id.abc.us-west-2.redshift.amazonaws.com")
                .port(5439)
                .build(),
        )
        .build();
    assert_eq!(
        endpoint_of(&cluster, "redshift-id").unwrap(),
        "redshift-id.abc.us-west-2.redshift.amazonaws.com:5439"
    );

    let cluster = Cluster::builder().cluster_identifier("redshift-id").build();
    assert!(endpoint_of(&cluster, "redshift-id").is_err());
}

#[tokio::test]
async fn test_poll_cluster_available_timeout_is_retryable() {
    let shared_config = crate::load_config(Some(String::from("us-west-2")), None).await;
    let manager = Manager::new(&shared_config);

    let ret = manager
        .poll_cluster_available("redshift-id", Duration::ZERO, DEFAULT_POLL_INTERVAL)
        .await;
    match ret {
        Err(Error::Other { message, retryable }) => {
            assert!(retryable);
            assert!(message.contains("redshift-id"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}
