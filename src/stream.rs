//! Live log streaming.
//!
//! Log backends are pull-based, so a stream session is a polling loop that
//! remembers the newest timestamp it has delivered (the high-water mark) and
//! only forwards entries strictly newer than it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::StreamingConfig;
use crate::message::AppEvent;
use crate::model::LogEntry;
use crate::provider::FunctionProvider;

/// Identity of one stream session. A newer session always has a larger id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// New entries, oldest first.
    Entries(Vec<LogEntry>),
    /// The session ended with an error; nothing follows.
    Failed(String),
}

/// A [`StreamItem`] tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    pub session: SessionId,
    pub item: StreamItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighWaterMark(DateTime<Utc>);

impl HighWaterMark {
    pub fn starting_at(now: DateTime<Utc>, lookback: std::time::Duration) -> Self {
        let lookback = chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::zero());
        Self(now - lookback)
    }

    pub const fn position(&self) -> DateTime<Utc> {
        self.0
    }

    /// Sort `entries`, drop everything at or before the mark, and advance the
    /// mark to the newest survivor.
    pub fn admit(&mut self, mut entries: Vec<LogEntry>) -> Vec<LogEntry> {
        entries.retain(|e| e.timestamp > self.0);
        entries.sort_by_key(|e| e.timestamp);
        if let Some(newest) = entries.last() {
            self.0 = newest.timestamp;
        }
        entries
    }
}

/// Poll `function`'s logs until `cancel` fires or a poll fails.
///
/// The receiver yields batches in delivery order; after a `Failed` item or
/// cancellation the channel closes.
pub fn stream_function_logs(
    provider: Arc<dyn FunctionProvider>,
    function: String,
    config: StreamingConfig,
    cancel: CancellationToken,
) -> UnboundedReceiver<StreamItem> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut mark = HighWaterMark::starting_at(Utc::now(), config.lookback());
        let mut ticker = tokio::time::interval(config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(function, since = %mark.position(), "Log stream started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = provider.log_entries(&function, mark.position(), config.buffer_capacity) => polled,
            };

            match polled {
                Ok(entries) => {
                    let fresh = mark.admit(entries);
                    if fresh.is_empty() {
                        continue;
                    }
                    tracing::trace!(function, count = fresh.len(), "Streamed log entries");
                    if tx.send(StreamItem::Entries(fresh)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(function, error = %err, "Log stream poll failed");
                    let _ = tx.send(StreamItem::Failed(format!("{err:#}")));
                    break;
                }
            }
        }
        tracing::info!(function, "Log stream ended");
    });
    rx
}

/// Runtime side of the single active stream session.
pub struct StreamSessions {
    provider: Arc<dyn FunctionProvider>,
    config: StreamingConfig,
    events: UnboundedSender<AppEvent>,
    active: Option<(SessionId, CancellationToken)>,
}

impl StreamSessions {
    pub fn new(
        provider: Arc<dyn FunctionProvider>,
        config: StreamingConfig,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            provider,
            config,
            events,
            active: None,
        }
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active.as_ref().map(|(id, _)| *id)
    }

    /// Start `session`, cancelling whatever was running first.
    pub fn start(&mut self, session: SessionId, function: String) {
        self.stop_all();

        let cancel = CancellationToken::new();
        let mut items = stream_function_logs(
            self.provider.clone(),
            function,
            self.config.clone(),
            cancel.clone(),
        );
        let events = self.events.clone();
        let forward_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    () = forward_cancel.cancelled() => break,
                    item = items.recv() => item,
                };
                let Some(item) = item else { break };
                if events.send(AppEvent::Stream(StreamUpdate { session, item })).is_err() {
                    break;
                }
            }
        });
        self.active = Some((session, cancel));
    }

    /// Stop `session` if it is the active one.
    pub fn stop(&mut self, session: SessionId) {
        if self.active() == Some(session) {
            self.stop_all();
        }
    }

    pub fn stop_all(&mut self) {
        if let Some((id, cancel)) = self.active.take() {
            tracing::debug!(session = id.0, "Cancelling log stream");
            cancel.cancel();
        }
    }
}

impl Drop for StreamSessions {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::provider::testing::FakeProvider;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn entry(secs: i64, message: &str) -> LogEntry {
        LogEntry::new(at(secs), "INFO", message)
    }

    fn fast_config() -> StreamingConfig {
        StreamingConfig {
            poll_interval_ms: 5,
            lookback_secs: 60,
            buffer_capacity: 1000,
        }
    }

    #[test]
    fn test_mark_starts_at_lookback() {
        let mark = HighWaterMark::starting_at(at(60), Duration::from_secs(60));
        assert_eq!(mark.position(), at(0));
    }

    #[test]
    fn test_admit_sorts_dedups_and_advances() {
        let mut mark = HighWaterMark(at(0));

        let first = mark.admit(vec![entry(3, "c"), entry(0, "boundary"), entry(1, "a")]);
        let messages: Vec<_> = first.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "c"]);
        assert_eq!(mark.position(), at(3));

        // Overlapping re-read: only strictly newer entries survive.
        let second = mark.admit(vec![entry(2, "old"), entry(3, "c"), entry(4, "d")]);
        assert_eq!(second, vec![entry(4, "d")]);
        assert_eq!(mark.position(), at(4));

        assert!(mark.admit(Vec::new()).is_empty());
        assert_eq!(mark.position(), at(4));
    }

    #[test]
    fn test_admitted_sequence_is_non_decreasing() {
        let mut mark = HighWaterMark(at(0));
        let mut delivered = Vec::new();
        for batch in [
            vec![entry(5, "e"), entry(2, "b"), entry(2, "b2")],
            vec![entry(4, "late"), entry(6, "f")],
            vec![entry(6, "f"), entry(9, "i"), entry(7, "g")],
        ] {
            let floor = mark.position();
            let fresh = mark.admit(batch);
            assert!(fresh.iter().all(|e| e.timestamp > floor));
            delivered.extend(fresh);
        }
        assert!(delivered.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(delivered.len(), 6);
    }

    #[tokio::test]
    async fn test_stream_delivers_then_fails() {
        let now = Utc::now();
        let provider = Arc::new(FakeProvider::default());
        provider.push_logs(Ok(vec![LogEntry::new(now, "INFO", "hello")]));
        provider.push_logs(Err(color_eyre::eyre::eyre!("throttled")));

        let mut rx = stream_function_logs(
            provider.clone(),
            "fn-a".to_string(),
            fast_config(),
            CancellationToken::new(),
        );

        match rx.recv().await.unwrap() {
            StreamItem::Entries(entries) => assert_eq!(entries[0].message, "hello"),
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv().await.unwrap() {
            StreamItem::Failed(message) => assert!(message.contains("throttled")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.recv().await.is_none());

        let calls = provider.log_calls.lock().unwrap().clone();
        assert_eq!(calls[1], now);
    }

    #[tokio::test]
    async fn test_cancel_closes_stream() {
        let provider = Arc::new(FakeProvider::default());
        let cancel = CancellationToken::new();
        let mut rx = stream_function_logs(provider, "fn-a".to_string(), fast_config(), cancel.clone());

        cancel.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_sessions_keep_exactly_one_active() {
        let provider = Arc::new(FakeProvider::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sessions = StreamSessions::new(provider.clone(), fast_config(), tx);

        sessions.start(SessionId(1), "fn-a".to_string());
        sessions.start(SessionId(2), "fn-a".to_string());
        assert_eq!(sessions.active(), Some(SessionId(2)));

        provider.push_logs(Ok(vec![LogEntry::new(Utc::now(), "INFO", "fresh")]));
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            AppEvent::Stream(update) => assert_eq!(update.session, SessionId(2)),
            other => panic!("unexpected {other:?}"),
        }

        sessions.stop(SessionId(1));
        assert_eq!(sessions.active(), Some(SessionId(2)));
        sessions.stop(SessionId(2));
        assert_eq!(sessions.active(), None);
    }
}
