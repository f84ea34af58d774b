//! Grid session: the event loop around one page
//!
//! Events are reduced one at a time. Every effect runs on its own tokio
//! task and reports back on a channel, so effects overlap freely while the
//! page state only ever changes inside [`GridSession::process_next`] and
//! [`GridSession::dispatch`].

use crate::error::ServiceResult;
use crate::executor::{Completion, EffectExecutor};
use std::path::PathBuf;
use tabula_grid::{PageEffect, PageEngine, PageEvent, PageRequest, PageState, RememberedPreferences, Update};
use tokio::sync::mpsc;

pub struct GridSession {
    engine: PageEngine,
    state: PageState,
    executor: EffectExecutor,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
    exports: Vec<PathBuf>,
}

impl GridSession {
    /// Load remembered preferences, initialize the page and start its
    /// effects
    #[tracing::instrument(skip_all, fields(table = %engine.grid().options().table))]
    pub async fn open(
        engine: PageEngine,
        request: PageRequest,
        executor: EffectExecutor,
    ) -> ServiceResult<Self> {
        let remembered = match executor.preferences().cloned() {
            Some(preferences) => tokio::task::spawn_blocking(move || preferences.load()).await??,
            None => RememberedPreferences::default(),
        };

        let Update { state, effects } = engine.initialize(request, remembered);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut session = Self {
            engine,
            state,
            executor,
            sender,
            receiver,
            in_flight: 0,
            exports: Vec::new(),
        };
        session.spawn_all(effects);
        Ok(session)
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn engine(&self) -> &PageEngine {
        &self.engine
    }

    /// Effects started but not yet reported back
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Workbooks written during this session, oldest first
    pub fn exports(&self) -> &[PathBuf] {
        &self.exports
    }

    /// Reduce `event` and start the effects it produced
    pub fn dispatch(&mut self, event: PageEvent) {
        let state = self.state.clone();
        let Update { state, effects } = self.engine.reduce(state, event);
        self.state = state;
        self.spawn_all(effects);
    }

    fn spawn_all(&mut self, effects: Vec<PageEffect>) {
        for effect in effects {
            self.in_flight += 1;
            let executor = self.executor.clone();
            let sender = self.sender.clone();
            let task = tokio::spawn(async move { executor.run(effect).await });
            tokio::spawn(async move {
                // A panicked effect still has to count as finished
                let completion = match task.await {
                    Ok(completion) => completion,
                    Err(e) => {
                        tracing::error!(error = %e, "effect task failed");
                        Completion::Done
                    }
                };
                if sender.send(completion).is_err() {
                    tracing::debug!("session closed before effect completed");
                }
            });
        }
    }

    /// Wait for the next effect to finish and apply its outcome. Returns
    /// false when nothing is in flight.
    pub async fn process_next(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        let Some(completion) = self.receiver.recv().await else {
            return false;
        };
        self.in_flight -= 1;
        match completion {
            Completion::Event(event) => self.dispatch(event),
            Completion::Exported(path) => {
                tracing::info!(path = %path.display(), "export finished");
                self.exports.push(path);
            }
            Completion::Done => {}
        }
        true
    }

    /// Process completions until no effect is in flight
    pub async fn run_until_idle(&mut self) {
        while self.process_next().await {}
    }
}
