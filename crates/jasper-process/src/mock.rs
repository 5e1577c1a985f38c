//! In-memory process for tests and client proxies

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ProcessError, Result};
use crate::info::ProcessInfo;
use crate::process::{
    consume_signal, fire_triggers, insert_tag, wait_result, Process, ProcessHandle,
    ProcessTrigger, SignalTrigger,
};
use crate::signal::Signal;

#[derive(Default)]
struct MockState {
    info: ProcessInfo,
    tags: Vec<String>,
    triggers: Vec<ProcessTrigger>,
    signal_triggers: Vec<SignalTrigger>,
    signals: Vec<Signal>,
}

/// A process with no OS child behind it.
///
/// State changes only when the test drives it with [`MockProcess::finish`].
/// Delivered signals are recorded instead of sent.
pub struct MockProcess {
    id: String,
    state: Mutex<MockState>,
    done: watch::Sender<bool>,
}

impl MockProcess {
    /// A running mock with the given ID. The ID may be empty.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let (done, _) = watch::channel(false);
        Self {
            state: Mutex::new(MockState {
                info: ProcessInfo {
                    id: id.clone(),
                    is_running: true,
                    ..Default::default()
                },
                ..Default::default()
            }),
            id,
            done,
        }
    }

    /// A running mock with a fresh ID.
    pub fn running() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Shared handle
    pub fn into_handle(self) -> ProcessHandle {
        Arc::new(self)
    }

    /// Move to the terminal state and fire triggers.
    pub fn finish(&self, exit_code: i32) {
        let (info, triggers) = {
            let mut state = self.state.lock();
            if state.info.complete {
                return;
            }
            state.info.finish(exit_code, false, false);
            (state.info.clone(), std::mem::take(&mut state.triggers))
        };
        fire_triggers(triggers, &info);
        self.done.send_replace(true);
    }

    /// Signals that reached the (absent) OS process, in order.
    pub fn signals(&self) -> Vec<Signal> {
        self.state.lock().signals.clone()
    }
}

#[async_trait]
impl Process for MockProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn info(&self, ctx: &CancellationToken) -> ProcessInfo {
        if ctx.is_cancelled() {
            return ProcessInfo::empty();
        }
        self.state.lock().info.clone()
    }

    async fn running(&self, _ctx: &CancellationToken) -> bool {
        self.state.lock().info.is_running
    }

    async fn complete(&self, _ctx: &CancellationToken) -> bool {
        self.state.lock().info.complete
    }

    async fn signal(&self, _ctx: &CancellationToken, signal: Signal) -> Result<()> {
        let mut state = self.state.lock();
        if state.info.complete {
            return Err(ProcessError::terminated());
        }
        if !consume_signal(&state.signal_triggers, &state.info, signal) {
            state.signals.push(signal);
        }
        Ok(())
    }

    async fn wait(&self, ctx: &CancellationToken) -> Result<i32> {
        let mut done = self.done.subscribe();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ProcessError::Canceled),
            _ = done.wait_for(|complete| *complete) => {}
        }
        wait_result(&self.state.lock().info)
    }

    async fn respawn(&self, _ctx: &CancellationToken) -> Result<ProcessHandle> {
        let options = self.state.lock().info.options.clone();
        let process = MockProcess::running();
        process.state.lock().info.options = options;
        Ok(Arc::new(process))
    }

    async fn register_trigger(&self, _ctx: &CancellationToken, trigger: ProcessTrigger) -> Result<()> {
        let mut state = self.state.lock();
        if state.info.complete {
            return Err(ProcessError::PreconditionFailed(
                "cannot register trigger after process exits".to_string(),
            ));
        }
        state.triggers.push(trigger);
        Ok(())
    }

    async fn register_signal_trigger(
        &self,
        _ctx: &CancellationToken,
        trigger: SignalTrigger,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.info.complete {
            return Err(ProcessError::PreconditionFailed(
                "cannot register signal trigger after process exits".to_string(),
            ));
        }
        state.signal_triggers.push(trigger);
        Ok(())
    }

    async fn tag(&self, _ctx: &CancellationToken, tag: &str) {
        insert_tag(&mut self.state.lock().tags, tag);
    }

    async fn get_tags(&self, _ctx: &CancellationToken) -> Vec<String> {
        self.state.lock().tags.clone()
    }

    async fn reset_tags(&self, _ctx: &CancellationToken) {
        self.state.lock().tags.clear();
    }
}
