use super::models::{split_log_lines, LogTarget};
use crate::config::Config;
use anyhow::{Context, Result};
use futures::stream::LocalBoxStream;
use futures::{AsyncBufRead, AsyncBufReadExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, LogParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config as KubeConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Builds a cluster client from `KUBECONFIG_PATH`, or infers one from the
/// environment (in-cluster service account or the default kubeconfig).
pub async fn get_client(config: &Config) -> Result<Client> {
    let kube_config = match &config.kube_config {
        Some(path) => {
            debug!(path = %path, "Reading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig from {}", path))?;
            KubeConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to create Kubernetes config")?
        }
        None => KubeConfig::infer()
            .await
            .context("Failed to infer Kubernetes config")?,
    };

    Client::try_from(kube_config).context("Failed to create Kubernetes client")
}

/// Reads the output of one container of a running pod.
pub struct PodLogs {
    pods: Api<Pod>,
    target: LogTarget,
    snapshot_params: LogParams,
    follow_params: LogParams,
}

impl PodLogs {
    pub fn new(client: Client, target: LogTarget) -> Self {
        let pods = Api::namespaced(client, &target.namespace);
        Self {
            pods,
            snapshot_params: target.log_params(false),
            follow_params: target.log_params(true),
            target,
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    /// Snapshot of the container output so far.
    pub async fn fetch_logs(&self) -> Result<Vec<String>> {
        let logs = self
            .pods
            .logs(&self.target.pod_id, &self.snapshot_params)
            .await
            .with_context(|| format!("Failed to fetch logs for pod {}", self.target.pod_id))?;

        let lines = split_log_lines(&logs);
        debug!(pod = %self.target.pod_id, lines = lines.len(), "Fetched pod logs");
        Ok(lines)
    }

    /// Follows the container output. The stream ends when the pod closes it
    /// or when `cancel` fires; dropping it also stops the read.
    pub async fn stream_logs(
        &self,
        cancel: CancellationToken,
    ) -> Result<LocalBoxStream<'_, Result<String>>> {
        let reader = self
            .pods
            .log_stream(&self.target.pod_id, &self.follow_params)
            .await
            .with_context(|| format!("Failed to stream logs for pod {}", self.target.pod_id))?;

        info!(
            pod = %self.target.pod_id,
            container = %self.target.container_name,
            namespace = %self.target.namespace,
            "Streaming pod logs"
        );

        Ok(log_lines(reader, cancel))
    }
}

/// Splits a followed log into lines until the reader closes or `cancel` fires.
fn log_lines<'a, R>(reader: R, cancel: CancellationToken) -> LocalBoxStream<'a, Result<String>>
where
    R: AsyncBufRead + 'a,
{
    reader
        .lines()
        .map(|line| line.context("Failed to read log line"))
        .take_until(cancel.cancelled_owned())
        .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_log_lines_reads_until_end() {
        let reader = Cursor::new(b"starting\nepoch 1\ndone".to_vec());
        let lines: Vec<String> = log_lines(reader, CancellationToken::new())
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["starting", "epoch 1", "done"]);
    }

    #[tokio::test]
    async fn test_log_lines_stop_on_cancel() {
        let cancel = CancellationToken::new();
        let mut lines = log_lines(Cursor::new(b"a\nb\nc\n".to_vec()), cancel.clone());

        assert_eq!(lines.next().await.unwrap().unwrap(), "a");
        cancel.cancel();
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_log_lines_empty_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut lines = log_lines(Cursor::new(b"a\n".to_vec()), cancel);
        assert!(lines.next().await.is_none());
    }
}
