//! Scripted Checkout Widget
//!
//! Stands in for the real overlay in tests and simulation: replays a fixed
//! list of events when opened and records how it was driven.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::widget::{
    CheckoutEvent, CheckoutEventSender, CheckoutOpenOptions, CheckoutWidget, CheckoutWidgetError,
    PaddleEnvironment,
};

#[derive(Default)]
struct WidgetState {
    initialized: bool,
    initialize_failure: Option<String>,
    open_failure: Option<String>,
    events: Vec<CheckoutEvent>,
    end_stream_after_script: bool,
    sender: Option<CheckoutEventSender>,
    initialize_calls: Vec<(String, PaddleEnvironment)>,
    open_calls: Vec<CheckoutOpenOptions>,
    close_calls: usize,
}

#[derive(Default)]
pub struct ScriptedCheckoutWidget {
    state: Mutex<WidgetState>,
}

impl ScriptedCheckoutWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out already initialized
    #[must_use]
    pub fn initialized(self) -> Self {
        self.state().initialized = true;
        self
    }

    /// Events emitted, in order, as soon as the checkout opens
    #[must_use]
    pub fn with_events(self, events: impl IntoIterator<Item = CheckoutEvent>) -> Self {
        self.state().events.extend(events);
        self
    }

    /// Drop the event stream after the scripted events, as a crashed overlay would
    #[must_use]
    pub fn ending_stream(self) -> Self {
        self.state().end_stream_after_script = true;
        self
    }

    #[must_use]
    pub fn with_initialize_error(self, message: impl Into<String>) -> Self {
        self.state().initialize_failure = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_open_error(self, message: impl Into<String>) -> Self {
        self.state().open_failure = Some(message.into());
        self
    }

    /// Emit an event on the open checkout; `false` if nothing is listening
    pub fn emit(&self, event: CheckoutEvent) -> bool {
        self.state()
            .sender
            .as_ref()
            .is_some_and(|sender| sender.emit(event))
    }

    pub fn initialize_calls(&self) -> Vec<(String, PaddleEnvironment)> {
        self.state().initialize_calls.clone()
    }

    pub fn open_calls(&self) -> Vec<CheckoutOpenOptions> {
        self.state().open_calls.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    fn state(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CheckoutWidget for ScriptedCheckoutWidget {
    async fn initialize(
        &self,
        token: &str,
        environment: PaddleEnvironment,
    ) -> Result<(), CheckoutWidgetError> {
        let mut state = self.state();
        state.initialize_calls.push((token.to_string(), environment));

        if let Some(message) = state.initialize_failure.clone() {
            return Err(CheckoutWidgetError::Initialization(message));
        }
        state.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    async fn open(
        &self,
        options: &CheckoutOpenOptions,
        events: CheckoutEventSender,
    ) -> Result<(), CheckoutWidgetError> {
        let mut state = self.state();
        state.open_calls.push(options.clone());

        if !state.initialized {
            return Err(CheckoutWidgetError::NotInitialized);
        }
        if let Some(message) = state.open_failure.clone() {
            return Err(CheckoutWidgetError::Open(message));
        }

        for event in &state.events {
            events.emit(event.clone());
        }
        if !state.end_stream_after_script {
            state.sender = Some(events);
        }
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state();
        state.close_calls += 1;
        if let Some(sender) = state.sender.take() {
            sender.emit(CheckoutEvent::Closed {
                user_initiated: false,
            });
        }
    }
}
