//! REST client for a remote Jasper service
//!
//! [`RestClient`] implements [`Manager`] so callers can drive a remote
//! service exactly like a local manager. Processes it hands out are
//! [`RemoteProcess`] proxies that forward every call over HTTP.
//!
//! Local-only capabilities cannot cross the wire: registering processes
//! on the remote manager and attaching closure triggers both fail with
//! a precondition error. Named signal triggers work, since the service
//! resolves them from its own registry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jasper_manager::{
    CachedLoggerInfo, Command, Filter, LoggingPayload, Manager, ManagerError,
    Result as ManagerResult,
};
use jasper_process::{
    CreateOptions, OutputOptions, Process, ProcessError, ProcessHandle, ProcessInfo,
    ProcessTrigger, Result as ProcessResult, Signal, SignalTrigger,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        IdResponse, OutcomeResponse, PruneResponse, SizeResponse, StatusResponse, WaitResponse,
    },
    routes::API_PREFIX,
};

async fn cancelable<T, F>(ctx: &CancellationToken, fut: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ApiError::Process(ProcessError::Canceled)),
        result = fut => result,
    }
}

/// Client for one REST service
#[derive(Debug, Clone)]
pub struct RestClient {
    base: String,
    http: reqwest::Client,
    id: String,
}

impl RestClient {
    /// Connect to the service at `url` (for example `http://localhost:2287`)
    /// and learn its manager ID.
    pub async fn connect(url: &str) -> ApiResult<Self> {
        let mut client = Self {
            base: format!("{}{}", url.trim_end_matches('/'), API_PREFIX),
            http: reqwest::Client::new(),
            id: String::new(),
        };
        client.id = client.manager_id().await?;
        debug!(url, manager = %client.id, "Connected to REST service");
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let status = status.as_u16();
        let text = match response.json::<OutcomeResponse>().await {
            Ok(outcome) => outcome.text,
            Err(_) => format!("request failed with status {}", status),
        };
        Err(ApiError::Service { status, text })
    }

    async fn outcome(&self, builder: RequestBuilder) -> ApiResult<()> {
        self.send::<OutcomeResponse>(builder).await.map(|_| ())
    }

    pub async fn status(&self) -> ApiResult<StatusResponse> {
        self.send(self.http.get(&self.base)).await
    }

    pub async fn manager_id(&self) -> ApiResult<String> {
        let response: IdResponse = self.send(self.http.get(self.url("/id"))).await?;
        Ok(response.id)
    }

    pub async fn create(&self, opts: &CreateOptions) -> ApiResult<ProcessInfo> {
        self.send(self.http.post(self.url("/create")).json(opts)).await
    }

    pub async fn list_info(&self, filter: Filter) -> ApiResult<Vec<ProcessInfo>> {
        self.send(self.http.get(self.url(&format!("/list/{}", filter))))
            .await
    }

    pub async fn group_info(&self, tag: &str) -> ApiResult<Vec<ProcessInfo>> {
        self.send(self.http.get(self.url(&format!("/list/group/{}", encode(tag)))))
            .await
    }

    pub async fn process_info(&self, id: &str) -> ApiResult<ProcessInfo> {
        self.send(self.http.get(self.url(&format!("/process/{}", encode(id)))))
            .await
    }

    pub async fn signal_process(&self, id: &str, signal: Signal) -> ApiResult<()> {
        let path = format!("/process/{}/signal/{}", encode(id), signal.as_wire());
        self.outcome(self.http.patch(self.url(&path))).await
    }

    pub async fn register_signal_trigger_id(&self, id: &str, trigger_id: &str) -> ApiResult<()> {
        let path = format!(
            "/process/{}/trigger/signal/{}",
            encode(id),
            encode(trigger_id)
        );
        self.outcome(self.http.patch(self.url(&path))).await
    }

    pub async fn wait_process(&self, id: &str) -> ApiResult<WaitResponse> {
        self.send(self.http.get(self.url(&format!("/process/{}/wait", encode(id)))))
            .await
    }

    pub async fn respawn_process(&self, id: &str) -> ApiResult<ProcessInfo> {
        self.send(self.http.post(self.url(&format!("/process/{}/respawn", encode(id)))))
            .await
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> ApiResult<()> {
        let url = self.url(&format!("/process/{}/tags", encode(id)));
        self.outcome(self.http.post(url).query(&[("add", tag)])).await
    }

    pub async fn get_tags(&self, id: &str) -> ApiResult<Vec<String>> {
        self.send(self.http.get(self.url(&format!("/process/{}/tags", encode(id)))))
            .await
    }

    pub async fn reset_tags(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/process/{}/tags", encode(id)));
        self.outcome(self.http.delete(url)).await
    }

    /// Last `count` lines of a process's in-memory logger
    pub async fn logs(&self, id: &str, count: usize) -> ApiResult<Vec<String>> {
        let url = self.url(&format!("/process/{}/logs", encode(id)));
        self.send(self.http.get(url).query(&[("count", count)])).await
    }

    pub async fn clear_processes(&self) -> ApiResult<()> {
        self.outcome(self.http.post(self.url("/clear"))).await
    }

    pub async fn close_manager(&self) -> ApiResult<()> {
        self.outcome(self.http.delete(self.url("/close"))).await
    }

    pub async fn create_logger(
        &self,
        id: &str,
        options: &OutputOptions,
    ) -> ApiResult<CachedLoggerInfo> {
        let url = self.url(&format!("/logging/id/{}", encode(id)));
        self.send(self.http.post(url).json(options)).await
    }

    pub async fn get_logger(&self, id: &str) -> ApiResult<CachedLoggerInfo> {
        self.send(self.http.get(self.url(&format!("/logging/id/{}", encode(id)))))
            .await
    }

    pub async fn remove_logger(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/logging/id/{}", encode(id)));
        self.outcome(self.http.delete(url)).await
    }

    pub async fn send_logs(&self, id: &str, payload: &LoggingPayload) -> ApiResult<()> {
        let url = self.url(&format!("/logging/id/{}/send", encode(id)));
        self.outcome(self.http.post(url).json(payload)).await
    }

    /// Drop remote loggers idle for longer than `ttl`.
    pub async fn prune_loggers(&self, ttl: Duration) -> ApiResult<usize> {
        let url = self.url(&format!("/logging/prune/{}", ttl.as_secs()));
        let response: PruneResponse = self.send(self.http.delete(url)).await?;
        Ok(response.removed)
    }

    pub async fn logging_cache_size(&self) -> ApiResult<usize> {
        let response: SizeResponse = self.send(self.http.get(self.url("/logging/size"))).await?;
        Ok(response.size)
    }

    fn remote(&self, info: ProcessInfo) -> ProcessHandle {
        Arc::new(RemoteProcess::new(self.clone(), info.id))
    }
}

#[async_trait]
impl Manager for RestClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_process(
        &self,
        ctx: &CancellationToken,
        opts: CreateOptions,
    ) -> ManagerResult<ProcessHandle> {
        let info = cancelable(ctx, self.create(&opts)).await?;
        Ok(self.remote(info))
    }

    fn create_command(self: Arc<Self>) -> Command {
        Command::with_manager(self)
    }

    async fn register(&self, _ctx: &CancellationToken, _process: ProcessHandle) -> ManagerResult<()> {
        Err(ManagerError::PreconditionFailed(
            "cannot register local processes on a remote manager".to_string(),
        ))
    }

    async fn get(&self, ctx: &CancellationToken, id: &str) -> ManagerResult<ProcessHandle> {
        let info = cancelable(ctx, self.process_info(id)).await?;
        Ok(self.remote(info))
    }

    async fn list(&self, ctx: &CancellationToken, filter: Filter) -> ManagerResult<Vec<ProcessHandle>> {
        let infos = cancelable(ctx, self.list_info(filter)).await?;
        Ok(infos.into_iter().map(|info| self.remote(info)).collect())
    }

    async fn group(&self, ctx: &CancellationToken, tag: &str) -> ManagerResult<Vec<ProcessHandle>> {
        let infos = cancelable(ctx, self.group_info(tag)).await?;
        Ok(infos.into_iter().map(|info| self.remote(info)).collect())
    }

    async fn clear(&self, ctx: &CancellationToken) {
        if let Err(err) = cancelable(ctx, self.clear_processes()).await {
            warn!(manager = %self.id, error = %err, "Remote clear failed");
        }
    }

    async fn close(&self, ctx: &CancellationToken) -> ManagerResult<()> {
        Ok(cancelable(ctx, self.close_manager()).await?)
    }
}

/// Proxy for a process owned by a remote service
#[derive(Debug, Clone)]
pub struct RemoteProcess {
    client: RestClient,
    id: String,
}

impl RemoteProcess {
    pub fn new(client: RestClient, id: impl Into<String>) -> Self {
        Self {
            client,
            id: id.into(),
        }
    }

    fn local_only(what: &str) -> ProcessError {
        ProcessError::PreconditionFailed(format!("cannot register {} on remote processes", what))
    }
}

#[async_trait]
impl Process for RemoteProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn info(&self, ctx: &CancellationToken) -> ProcessInfo {
        match cancelable(ctx, self.client.process_info(&self.id)).await {
            Ok(info) => info,
            Err(err) => {
                debug!(id = %self.id, error = %err, "Remote info unavailable");
                ProcessInfo::empty()
            }
        }
    }

    async fn running(&self, ctx: &CancellationToken) -> bool {
        self.info(ctx).await.is_running
    }

    async fn complete(&self, ctx: &CancellationToken) -> bool {
        self.info(ctx).await.complete
    }

    async fn signal(&self, ctx: &CancellationToken, signal: Signal) -> ProcessResult<()> {
        Ok(cancelable(ctx, self.client.signal_process(&self.id, signal)).await?)
    }

    async fn wait(&self, ctx: &CancellationToken) -> ProcessResult<i32> {
        let response = cancelable(ctx, self.client.wait_process(&self.id)).await?;
        if response.exit_code == 0 && response.error.is_none() {
            return Ok(0);
        }
        Err(ProcessError::NonZeroExit {
            code: response.exit_code,
            timed_out: response.timed_out,
        })
    }

    async fn respawn(&self, ctx: &CancellationToken) -> ProcessResult<ProcessHandle> {
        let info = cancelable(ctx, self.client.respawn_process(&self.id)).await?;
        Ok(self.client.remote(info))
    }

    async fn register_trigger(
        &self,
        _ctx: &CancellationToken,
        _trigger: ProcessTrigger,
    ) -> ProcessResult<()> {
        Err(Self::local_only("triggers"))
    }

    async fn register_signal_trigger(
        &self,
        _ctx: &CancellationToken,
        _trigger: SignalTrigger,
    ) -> ProcessResult<()> {
        Err(Self::local_only("signal triggers"))
    }

    async fn register_signal_trigger_id(&self, ctx: &CancellationToken, id: &str) -> ProcessResult<()> {
        Ok(cancelable(ctx, self.client.register_signal_trigger_id(&self.id, id)).await?)
    }

    async fn tag(&self, ctx: &CancellationToken, tag: &str) {
        if let Err(err) = cancelable(ctx, self.client.add_tag(&self.id, tag)).await {
            warn!(id = %self.id, tag, error = %err, "Remote tag failed");
        }
    }

    async fn get_tags(&self, ctx: &CancellationToken) -> Vec<String> {
        cancelable(ctx, self.client.get_tags(&self.id))
            .await
            .unwrap_or_else(|err| {
                warn!(id = %self.id, error = %err, "Remote tag lookup failed");
                Vec::new()
            })
    }

    async fn reset_tags(&self, ctx: &CancellationToken) {
        if let Err(err) = cancelable(ctx, self.client.reset_tags(&self.id)).await {
            warn!(id = %self.id, error = %err, "Remote tag reset failed");
        }
    }
}
