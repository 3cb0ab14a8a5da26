// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sync orchestrator: one worker per chat under a bounded pool.
//!
//! Each worker owns its chat's watermark for the whole run, so no two tasks
//! ever advance the same watermark. Backfill passes hold a pool permit;
//! waiting on a live subscription does not.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use telesave_core::{
    Chat, LiveEvent, MessageEdit, RawMessage, TelesaveError, WalkMode, Watermark,
};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::pipeline::{Ingested, forward_if_needed, ingest};
use crate::report::{ChatReport, SyncReport};
use crate::retry::pause;
use crate::state::ChatState;
use crate::walker::HistoryWalker;

/// Drives every selected chat from its stored watermark to live.
pub struct SyncOrchestrator {
    ctx: Arc<SyncContext>,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(ctx: SyncContext, shutdown: CancellationToken) -> Self {
        Self {
            ctx: Arc::new(ctx),
            shutdown,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Run until every chat is done or shutdown is requested.
    ///
    /// Per-chat failures end up in the report. Only process-fatal errors
    /// (authentication) and startup failures are returned as `Err`. The
    /// store is closed in every case.
    pub async fn run(&self) -> Result<SyncReport, TelesaveError> {
        let result = self.run_inner().await;
        if let Err(e) = self.ctx.store.close().await {
            warn!(error = %e, "failed to close archive store");
        }
        result
    }

    async fn run_inner(&self) -> Result<SyncReport, TelesaveError> {
        let options = &self.ctx.options;
        let account = tokio::time::timeout(options.call_timeout, self.ctx.service.authenticate())
            .await
            .map_err(|_| TelesaveError::Timeout {
                duration: options.call_timeout,
            })??;
        info!(user_id = account.user_id, name = %account.display_name, "authenticated");

        let chats = self.discover_chats().await?;
        info!(count = chats.len(), mode = ?options.mode, "chats selected for sync");

        let mut report = SyncReport::default();
        if self.ctx.interceptor.is_enabled() {
            self.retry_pending_forwards(&mut report).await?;
        }

        let permits = Arc::new(Semaphore::new(options.max_concurrent_chats.max(1)));
        let workers = self.shutdown.child_token();
        let mut set = JoinSet::new();
        let mut spawned = HashMap::new();
        for chat in chats {
            let identity = (chat.id, chat.name.clone());
            let worker = ChatWorker::new(self.ctx.clone(), chat, workers.clone());
            let handle = set.spawn(worker.run(permits.clone()));
            spawned.insert(handle.id(), identity);
        }

        let mut fatal = None;
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, Ok(chat_report))) => report.chats.push(chat_report),
                Ok((_, Err(e))) => {
                    error!(error = %e, "fatal error in chat worker, stopping all chats");
                    workers.cancel();
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    let Some((chat_id, name)) = spawned.remove(&e.id()) else {
                        error!(error = %e, "unknown chat worker died");
                        continue;
                    };
                    error!(%chat_id, error = %e, "chat worker panicked");
                    let mut failed = ChatReport::new(chat_id, name);
                    failed.state = ChatState::Failed;
                    failed.reason = Some(worker_death_reason(e));
                    failed.watermark = self.ctx.store.get_watermark(chat_id).await.ok();
                    report.chats.push(failed);
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        report.chats.sort_by_key(|c| c.chat_id);
        Ok(report)
    }

    /// List, filter, dedupe and register the chats to sync.
    async fn discover_chats(&self) -> Result<Vec<Chat>, TelesaveError> {
        let options = &self.ctx.options;
        let listed = tokio::time::timeout(options.call_timeout, self.ctx.service.list_chats())
            .await
            .map_err(|_| TelesaveError::Timeout {
                duration: options.call_timeout,
            })??;

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for chat in listed {
            if !options.wants(&chat) {
                debug!(chat_id = %chat.id, kind = %chat.kind, archived = chat.archived, "chat skipped");
                continue;
            }
            if !seen.insert(chat.id) {
                continue;
            }
            self.ctx.store.upsert_chat(&chat).await?;
            selected.push(chat);
        }
        Ok(selected)
    }

    /// Re-forward self-destructing records left unforwarded by earlier runs.
    async fn retry_pending_forwards(&self, report: &mut SyncReport) -> Result<(), TelesaveError> {
        let pending = self.ctx.store.unforwarded_ephemeral().await?;
        if pending.is_empty() {
            return Ok(());
        }
        info!(count = pending.len(), "retrying pending forwards");

        for mut record in pending {
            match forward_if_needed(&self.ctx, &mut record, &self.shutdown).await {
                Ok((true, _)) => report.pending_forwards_retried += 1,
                Ok((false, Some(_))) => report.pending_forward_failures += 1,
                Ok((false, None)) => {}
                Err(TelesaveError::Cancelled) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn worker_death_reason(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return format!("worker stopped: {err}");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("worker panicked: {message}")
}

/// Why a live loop ended.
enum LiveExit {
    Shutdown,
    /// The subscription dropped or an event could not be ingested.
    Gap,
}

/// Sequential worker for a single chat.
struct ChatWorker {
    ctx: Arc<SyncContext>,
    chat: Chat,
    state: ChatState,
    report: ChatReport,
    cancel: CancellationToken,
    /// `--all` starts one new replay per run, on the first backfill.
    replay_pending: bool,
}

impl ChatWorker {
    fn new(ctx: Arc<SyncContext>, chat: Chat, cancel: CancellationToken) -> Self {
        let report = ChatReport::new(chat.id, chat.name.clone());
        let replay_pending = ctx.options.mode == WalkMode::FullHistory;
        Self {
            ctx,
            chat,
            state: ChatState::Idle,
            report,
            cancel,
            replay_pending,
        }
    }

    async fn run(mut self, permits: Arc<Semaphore>) -> Result<ChatReport, TelesaveError> {
        let mut gaps = 0u32;
        loop {
            self.transition(ChatState::Backfilling);

            // Subscribe first so nothing slips between backfill and live.
            let subscription = if self.ctx.options.live {
                match self.ctx.service.subscribe_live(&self.chat).await {
                    Ok(rx) => Some(rx),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(chat_id = %self.chat.id, error = %e, "live subscription failed");
                        None
                    }
                }
            } else {
                None
            };

            let watermark = match self.backfill(&permits).await {
                Ok((watermark, true)) => watermark,
                Ok((_, false)) => {
                    let passes = self.ctx.options.max_walk_passes;
                    self.report.reason =
                        Some(format!("still behind the latest message after {passes} walk passes"));
                    warn!(chat_id = %self.chat.id, passes, "backfill did not catch up");
                    return Ok(self.report);
                }
                Err(e) => return self.settle(e),
            };

            self.transition(ChatState::Live);
            if !self.ctx.options.live {
                return Ok(self.report);
            }

            let exit = match subscription {
                Some(rx) => match self.live(rx, watermark).await {
                    Ok(exit) => exit,
                    Err(e) => return self.settle(e),
                },
                None => LiveExit::Gap,
            };
            match exit {
                LiveExit::Shutdown => return Ok(self.report),
                LiveExit::Gap => {
                    gaps += 1;
                    let delay = self.ctx.options.retry.delay_for(gaps);
                    info!(chat_id = %self.chat.id, gaps, ?delay, "live gap, backfilling again");
                    if let Err(e) = pause(delay, &self.cancel).await {
                        return self.settle(e);
                    }
                }
            }
        }
    }

    /// Run walk passes until caught up, holding a pool permit throughout.
    ///
    /// Returns the final watermark and whether it reached the latest known
    /// message.
    async fn backfill(&mut self, permits: &Semaphore) -> Result<(Watermark, bool), TelesaveError> {
        let _permit = tokio::select! {
            permit = permits.acquire() => permit
                .map_err(|_| TelesaveError::Internal("worker pool closed".into()))?,
            _ = self.cancel.cancelled() => return Err(TelesaveError::Cancelled),
        };

        let store = &self.ctx.store;
        let mut watermark = store.get_watermark(self.chat.id).await?;
        if std::mem::take(&mut self.replay_pending) {
            if watermark.is_replaying() {
                info!(chat_id = %self.chat.id, cursor = %watermark.cursor(), "resuming full history replay");
            } else {
                let replay = watermark.begin_replay();
                store.advance_watermark(&replay).await?;
                info!(chat_id = %self.chat.id, epoch = replay.replay_epoch, "starting full history replay");
                watermark = replay;
            }
        }
        info!(chat_id = %self.chat.id, %watermark, "backfilling");
        self.report.watermark = Some(watermark);

        for pass in 1..=self.ctx.options.max_walk_passes.max(1) {
            let (next, caught_up) = self.walk_pass(watermark).await?;
            watermark = next;
            if caught_up {
                info!(chat_id = %self.chat.id, pass, %watermark, "caught up");
                return Ok((watermark, true));
            }
            debug!(chat_id = %self.chat.id, pass, "walk ended behind the latest message");
        }
        Ok((watermark, false))
    }

    async fn walk_pass(&mut self, mut watermark: Watermark) -> Result<(Watermark, bool), TelesaveError> {
        let options = &self.ctx.options;
        let mut walker = HistoryWalker::new(
            self.ctx.service.clone(),
            self.chat.clone(),
            watermark.cursor(),
            options.page_size,
            options.call_timeout,
            options.retry.clone(),
            self.cancel.clone(),
        );
        walker.probe_latest().await?;

        while let Some(raw) = walker.next().await? {
            if self.cancel.is_cancelled() {
                return Err(TelesaveError::Cancelled);
            }
            let ingested = ingest(&self.ctx, raw, &watermark, &self.cancel).await?;
            watermark = ingested.watermark;
            self.tally(&ingested);
        }

        let done = watermark.completed();
        if done.progresses_past(&watermark) {
            self.ctx.store.advance_watermark(&done).await?;
            watermark = done;
            self.report.watermark = Some(watermark);
        }

        let caught_up = walker
            .latest_known()
            .is_none_or(|latest| watermark.last_synced_message_id >= latest);
        debug!(
            chat_id = %self.chat.id,
            pages = walker.pages_fetched(),
            latest = ?walker.latest_known(),
            caught_up,
            "walk pass finished"
        );
        Ok((watermark, caught_up))
    }

    async fn live(
        &mut self,
        mut rx: mpsc::Receiver<LiveEvent>,
        mut watermark: Watermark,
    ) -> Result<LiveExit, TelesaveError> {
        info!(chat_id = %self.chat.id, "live");
        loop {
            let event = tokio::select! {
                event = rx.recv() => event,
                _ = self.cancel.cancelled() => return Ok(LiveExit::Shutdown),
            };
            let Some(event) = event else {
                warn!(chat_id = %self.chat.id, "live subscription closed");
                return Ok(LiveExit::Gap);
            };
            if event.chat_id() != self.chat.id {
                debug!(chat_id = %self.chat.id, other = %event.chat_id(), "event for another chat dropped");
                continue;
            }

            let exit = match event {
                LiveEvent::NewMessage(raw) => self.live_ingest(raw, &mut watermark).await?,
                LiveEvent::SelfDestruct(mut raw) => {
                    raw.ephemeral = true;
                    self.live_ingest(raw, &mut watermark).await?
                }
                LiveEvent::MessageEdited(edit) => {
                    self.apply_edit(&edit).await?;
                    None
                }
            };
            if let Some(exit) = exit {
                return Ok(exit);
            }
        }
    }

    async fn live_ingest(
        &mut self,
        raw: RawMessage,
        watermark: &mut Watermark,
    ) -> Result<Option<LiveExit>, TelesaveError> {
        let message_id = raw.id;
        match ingest(&self.ctx, raw, watermark, &self.cancel).await {
            Ok(ingested) => {
                *watermark = ingested.watermark;
                self.tally(&ingested);
                Ok(None)
            }
            Err(e)
                if e.is_fatal()
                    || matches!(
                        e,
                        TelesaveError::Cancelled | TelesaveError::WalkerExhausted { .. }
                    ) =>
            {
                Err(e)
            }
            Err(e) => {
                warn!(chat_id = %self.chat.id, %message_id, error = %e, "live ingest failed");
                Ok(Some(LiveExit::Gap))
            }
        }
    }

    async fn apply_edit(&mut self, edit: &MessageEdit) -> Result<(), TelesaveError> {
        let store = &self.ctx.store;
        if store.get_message(edit.chat_id, edit.message_id).await?.is_none() {
            debug!(chat_id = %edit.chat_id, message_id = %edit.message_id, "edit of unarchived message ignored");
            return Ok(());
        }
        store.record_edit(edit).await?;
        self.report.edits += 1;
        debug!(chat_id = %edit.chat_id, message_id = %edit.message_id, "edit recorded");
        Ok(())
    }

    fn tally(&mut self, ingested: &Ingested) {
        let report = &mut self.report;
        if ingested.created {
            report.archived += 1;
        } else {
            report.duplicates += 1;
        }
        report.downloads += ingested.downloads as u64;
        if ingested.forwarded_now {
            report.forwarded += 1;
        }
        if ingested.forward_error.is_some() {
            report.forward_failures += 1;
        }
        if ingested.edited {
            report.edits += 1;
        }
        report.watermark = Some(ingested.watermark);
    }

    fn transition(&mut self, next: ChatState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(chat_id = %self.chat.id, from = %self.state, to = %next, "invalid state transition ignored");
            return;
        }
        debug!(chat_id = %self.chat.id, from = %self.state, to = %next, "state change");
        self.state = next;
        self.report.state = next;
    }

    /// Turn a worker error into the chat's final report, or propagate it
    /// when it must stop the whole run.
    fn settle(mut self, err: TelesaveError) -> Result<ChatReport, TelesaveError> {
        if err.is_fatal() {
            return Err(err);
        }
        match err {
            TelesaveError::WalkerExhausted { .. } => {
                error!(chat_id = %self.chat.id, error = %err, "chat failed");
                if self.state == ChatState::Idle {
                    self.transition(ChatState::Backfilling);
                }
                self.transition(ChatState::Failed);
            }
            TelesaveError::Cancelled => {
                info!(chat_id = %self.chat.id, state = %self.state, "stopped by shutdown");
                if self.state == ChatState::Live {
                    return Ok(self.report);
                }
            }
            _ => {
                error!(chat_id = %self.chat.id, error = %err, "chat sync stopped");
                self.transition(ChatState::Backfilling);
            }
        }
        self.report.reason = Some(match err {
            TelesaveError::Cancelled => "interrupted by shutdown".to_string(),
            other => other.to_string(),
        });
        Ok(self.report)
    }
}
