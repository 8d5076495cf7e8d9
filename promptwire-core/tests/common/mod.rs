//! Helpers shared by the integration tests

#![allow(dead_code)]

use promptwire_core::config::GenerationParams;
use promptwire_core::http::HttpClient;
use promptwire_core::protocol::{
    ChannelSink, ErrorNotice, LogMessage, Message, MessageMode, Notification, NotificationSink,
};
use promptwire_core::providers::ProviderContext;
use promptwire_core::proxy::Proxy;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Route adapter logs to the test output; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Direct context with default parameters
pub fn context() -> ProviderContext {
    context_with(Proxy::Direct, GenerationParams::default())
}

pub fn context_with(proxy: Proxy, params: GenerationParams) -> ProviderContext {
    ProviderContext::new(HttpClient::new().unwrap(), proxy, params)
}

/// Everything the sink received so far
pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        notifications.push(notification);
    }
    notifications
}

pub fn channel() -> (ChannelSink, UnboundedReceiver<Notification>) {
    ChannelSink::new()
}

/// Message notifications only, as (mode, role, text)
pub fn messages(notifications: &[Notification]) -> Vec<(MessageMode, String, String)> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Message { message, mode } => {
                Some((*mode, message.role.clone(), message.text.clone()))
            }
            _ => None,
        })
        .collect()
}

pub fn logs(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Log(log) => Some(log.text.clone()),
            _ => None,
        })
        .collect()
}

pub fn errors(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Error(notice) => Some(notice.text.clone()),
            _ => None,
        })
        .collect()
}

pub fn sse_body(events: &[&str]) -> String {
    events.iter().map(|e| format!("{}\n\n", e)).collect()
}

/// Sink that cancels the request as soon as the first delta arrives
pub struct CancelOnFirstAppend {
    pub cancel: CancellationToken,
    pub received: Mutex<Vec<Notification>>,
}

impl CancelOnFirstAppend {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }
}

impl NotificationSink for CancelOnFirstAppend {
    fn on_message(&self, message: Message, mode: MessageMode) {
        self.received
            .lock()
            .unwrap()
            .push(Notification::Message { message, mode });
        if mode == MessageMode::Append {
            self.cancel.cancel();
        }
    }

    fn on_log(&self, log: LogMessage) {
        self.received.lock().unwrap().push(Notification::Log(log));
    }

    fn on_error(&self, notice: ErrorNotice) {
        self.received.lock().unwrap().push(Notification::Error(notice));
    }
}
