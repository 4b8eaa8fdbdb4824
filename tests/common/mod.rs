//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds an [`AppContext`] around a
//! `/bin/sh` stream program writing into a temporary output directory, and
//! serves the router on a random port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use sg_core::config::Config;
use sg_server::context::AppContext;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running server plus the directory its stream writes into.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub output_dir: TempDir,
    cancel: CancellationToken,
    server: Option<JoinHandle<sg_core::Result<()>>>,
}

impl TestHarness {
    /// Config whose stream program runs `script` under `sh -c`.
    pub fn sh_config(output_dir: &Path, script: &str) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.stream.program = "sh".into();
        config.stream.args = vec!["-c".into(), script.into()];
        config.stream.output_dir = output_dir.to_path_buf();
        config.stream.graceful_timeout_secs = 2;
        config
    }

    /// Start a server whose stream program runs `script`.
    pub async fn with_script(script: &str) -> Self {
        let output_dir = tempfile::tempdir().expect("failed to create output dir");
        let config = Self::sh_config(output_dir.path(), script);
        Self::with_config(config, output_dir).await
    }

    /// Start a server with a custom config on a random port.
    pub async fn with_config(config: Config, output_dir: TempDir) -> Self {
        let ctx = AppContext::new(config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let cancel = CancellationToken::new();
        let server = tokio::spawn(sg_server::serve(listener, ctx.clone(), cancel.clone()));

        Self {
            ctx,
            addr,
            output_dir,
            cancel,
            server: Some(server),
        }
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// GET `path` and decode the JSON body.
    pub async fn get(&self, path: &str) -> (u16, serde_json::Value) {
        let resp = reqwest::get(self.url(path)).await.expect("request failed");
        let status = resp.status().as_u16();
        let body = resp.json().await.expect("body is not JSON");
        (status, body)
    }

    /// POST `path` with an empty body and decode the JSON response.
    pub async fn post(&self, path: &str) -> (u16, serde_json::Value) {
        let resp = reqwest::Client::new()
            .post(self.url(path))
            .send()
            .await
            .expect("request failed");
        let status = resp.status().as_u16();
        let body = resp.json().await.expect("body is not JSON");
        (status, body)
    }

    /// Poll `GET path` until `done` accepts the body.
    pub async fn poll_until<F>(&self, path: &str, done: F) -> serde_json::Value
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        for _ in 0..300 {
            let (_, body) = self.get(path).await;
            if done(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out polling {path}");
    }

    /// Trigger graceful shutdown and wait for the server to return.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(server) = self.server.take() {
            server
                .await
                .expect("server task panicked")
                .expect("server returned an error");
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
