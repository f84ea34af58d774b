//! Effect executor
//!
//! Runs the effects produced by the page and grid reducers against the
//! record store, preference storage and workbook writer, and turns each
//! outcome into the event that completes it.

use crate::error::{ServiceError, ServiceResult};
use crate::preferences::PreferenceStorage;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tabula_core::RecordStore;
use tabula_grid::{Effect, ExportSheet, GridEvent, PageEffect, PageEvent};
use tabula_interchange::XlsxExporter;

/// What running one effect produced
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// An event to feed back into the page reducer
    Event(PageEvent),
    /// A workbook was written
    Exported(PathBuf),
    /// Nothing to report
    Done,
}

#[derive(Clone)]
pub struct EffectExecutor {
    store: Arc<dyn RecordStore>,
    preferences: Option<Arc<PreferenceStorage>>,
    exporter: Option<XlsxExporter>,
}

impl std::fmt::Debug for EffectExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectExecutor")
            .field("preferences", &self.preferences)
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

impl EffectExecutor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            preferences: None,
            exporter: None,
        }
    }

    pub fn with_preferences(mut self, preferences: Arc<PreferenceStorage>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_exporter(mut self, exporter: XlsxExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn preferences(&self) -> Option<&Arc<PreferenceStorage>> {
        self.preferences.as_ref()
    }

    /// Run one effect to completion
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn run(&self, effect: PageEffect) -> Completion {
        match effect {
            PageEffect::Grid(effect) => self.run_grid(effect).await,

            PageEffect::LoadViews { request } => {
                let event = match self.store.query(request).await {
                    Ok(response) => PageEvent::ViewsLoaded { response },
                    Err(e) => PageEvent::LoadFailed {
                        error: e.to_string(),
                    },
                };
                Completion::Event(event)
            }

            PageEffect::LoadFilters { request } => {
                let event = match self.store.query(request).await {
                    Ok(response) => PageEvent::FiltersLoaded { response },
                    Err(e) => PageEvent::LoadFailed {
                        error: e.to_string(),
                    },
                };
                Completion::Event(event)
            }

            PageEffect::StoreFilter { request } => {
                let event = match self.store.store(request).await {
                    Ok(response) => PageEvent::FilterSaved {
                        record: response.record,
                    },
                    Err(e) => PageEvent::StoreFailed {
                        error: e.to_string(),
                    },
                };
                Completion::Event(event)
            }

            PageEffect::DeleteFilter { request } => {
                let filter = request.record_id.clone();
                let event = match self.store.delete(request).await {
                    Ok(()) => PageEvent::FilterDeleted { filter },
                    Err(e) => PageEvent::StoreFailed {
                        error: e.to_string(),
                    },
                };
                Completion::Event(event)
            }

            PageEffect::RememberView { table, view_id } => {
                let result = self
                    .on_preferences(move |preferences| preferences.remember_view(&table, &view_id))
                    .await;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to remember selected view");
                }
                Completion::Done
            }
        }
    }

    async fn run_grid(&self, effect: Effect) -> Completion {
        let event = match effect {
            Effect::Query {
                request_id,
                request,
            } => match self.store.query(request).await {
                Ok(response) => GridEvent::DataFetched {
                    request_id,
                    response,
                },
                Err(e) => GridEvent::QueryFailed {
                    request_id,
                    error: e.to_string(),
                },
            },

            Effect::ScheduleFetchIncrease { generation, delay } => {
                tokio::time::sleep(delay).await;
                GridEvent::IncreaseFetch { generation }
            }

            Effect::BulkQuery { request } => match self.store.query(request).await {
                Ok(response) => GridEvent::BulkFetched { response },
                Err(e) => GridEvent::BulkQueryFailed {
                    error: e.to_string(),
                },
            },

            Effect::Commit { record_id, request } => {
                let result = self
                    .store
                    .store(request)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string());
                GridEvent::BulkCommitted { record_id, result }
            }

            Effect::ExportQuery { request } => match self.store.query(request).await {
                Ok(response) => GridEvent::ExportFetched {
                    response,
                    date: Local::now().date_naive(),
                },
                Err(e) => GridEvent::ExportFailed {
                    error: e.to_string(),
                },
            },

            Effect::WriteWorkbook { sheet } => match self.write_workbook(sheet).await {
                Ok(path) => return Completion::Exported(path),
                Err(e) => GridEvent::ExportFailed {
                    error: e.to_string(),
                },
            },

            Effect::PersistWidths { view_id, widths } => {
                let result = self
                    .on_preferences(move |preferences| preferences.save_widths(&view_id, &widths))
                    .await;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to persist column widths");
                }
                return Completion::Done;
            }
        };
        Completion::Event(PageEvent::Grid(event))
    }

    async fn write_workbook(&self, sheet: ExportSheet) -> ServiceResult<PathBuf> {
        let exporter = self
            .exporter
            .clone()
            .ok_or(ServiceError::ExportNotConfigured)?;
        let path = tokio::task::spawn_blocking(move || exporter.write(&sheet)).await??;
        Ok(path)
    }

    /// Run a blocking storage call off the async workers; a missing
    /// storage is not an error
    async fn on_preferences<F>(&self, f: F) -> ServiceResult<()>
    where
        F: FnOnce(&PreferenceStorage) -> anyhow::Result<()> + Send + 'static,
    {
        let Some(preferences) = self.preferences.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || f(&preferences)).await??;
        Ok(())
    }
}
