//! Subcommand implementations
//!
//! Every command opens a [`GridSession`] over the fixture's in-memory store,
//! drives it until idle and reports from the resulting page state.

use crate::cli::{BrowseArgs, CheckFilterArgs, Command, ExportArgs};
use crate::fixture::Fixture;
use anyhow::{Context, Result, anyhow, bail};
use comfy_table::Table;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tabula_core::FieldKind;
use tabula_grid::{
    FILTER_PARAMETER, GridEngine, GridEvent, GridState, PageEvent, PageRequest, SORT_PARAMETER,
    SORT_REVERSED_PARAMETER, TypeRegistry, compile_column,
};
use tabula_interchange::XlsxExporter;
use tabula_services::{EffectExecutor, GridSession, PreferenceStorage};
use tabula_settings::TabulaSettings;

pub struct Runner {
    settings: TabulaSettings,
    preferences: Option<Arc<PreferenceStorage>>,
}

impl Runner {
    pub fn new(settings: TabulaSettings, preferences: Option<Arc<PreferenceStorage>>) -> Self {
        Self {
            settings,
            preferences,
        }
    }

    pub async fn run(&self, command: Command, out: &mut impl Write) -> Result<()> {
        match command {
            Command::Browse(args) => self.browse(&args, out).await,
            Command::Export(args) => {
                let path = self.export(&args).await?;
                writeln!(out, "{}", path.display())?;
                Ok(())
            }
            Command::CheckFilter(args) => {
                writeln!(out, "{}", check_filter(&args)?)?;
                Ok(())
            }
        }
    }

    #[tracing::instrument(skip_all, fields(fixture = %args.fixture.display()))]
    pub async fn browse(&self, args: &BrowseArgs, out: &mut impl Write) -> Result<()> {
        let session = self.open(args, None).await?;
        let grid = current_grid(&session)?;
        let engine = session.engine().grid();

        for report in engine.filter_reports(grid) {
            if report.is_unsupported() {
                writeln!(out, "note: {} cannot be filtered; {:?} ignored", report.column, report.text)?;
            } else if report.is_invalid() {
                writeln!(out, "note: part of {:?} on {} was not understood", report.text, report.column)?;
            }
        }
        write!(out, "{}", render_table(engine, grid))?;
        Ok(())
    }

    /// Export the filtered view and return the workbook's path
    #[tracing::instrument(skip_all, fields(fixture = %args.browse.fixture.display()))]
    pub async fn export(&self, args: &ExportArgs) -> Result<PathBuf> {
        let output_dir = match &args.output_dir {
            Some(dir) => dir.clone(),
            None => self.settings.export.resolved_output_dir()?,
        };
        let mut session = self
            .open(&args.browse, Some(XlsxExporter::new(output_dir)))
            .await?;
        session.dispatch(PageEvent::Grid(GridEvent::ExportRequested));
        session.run_until_idle().await;

        if let Some(path) = session.exports().last() {
            return Ok(path.clone());
        }
        let error = session
            .state()
            .grid
            .as_ref()
            .and_then(|grid| grid.last_error.clone())
            .unwrap_or_else(|| "no workbook was written".to_string());
        bail!("export failed: {}", error)
    }

    async fn open(&self, args: &BrowseArgs, exporter: Option<XlsxExporter>) -> Result<GridSession> {
        let fixture = Fixture::load(&args.fixture)?;

        let mut fetch = self.settings.grid.fetch_config();
        if let Some(limit) = args.limit {
            fetch.initial_rows = limit.max(1);
        }
        let engine = fixture.page_engine(fetch, self.settings.user.clone());

        let mut request = PageRequest::default();
        let mut explicit_view = None;
        if let Some(name) = &args.view {
            let id = fixture
                .view_id(name)
                .ok_or_else(|| anyhow!("no view named {:?} in {}", name, fixture.table))?;
            explicit_view = Some(id.clone());
            request = request.view(id);
        }
        if let Some(name) = &args.saved_filter {
            let id = fixture
                .filter_id(name)
                .ok_or_else(|| anyhow!("no saved filter named {:?}", name))?;
            request = request.parameter(FILTER_PARAMETER, id);
        }
        for (column, text) in &args.filters {
            request = request.parameter(column.clone(), text.clone());
        }
        if let Some(sort) = &args.sort {
            request = request.parameter(SORT_PARAMETER, sort.clone());
        }
        if args.desc {
            request = request.parameter(SORT_REVERSED_PARAMETER, "true");
        }

        let mut executor = EffectExecutor::new(Arc::new(fixture.store()?));
        if let Some(preferences) = &self.preferences {
            executor = executor.with_preferences(preferences.clone());
        }
        if let Some(exporter) = exporter {
            executor = executor.with_exporter(exporter);
        }

        let mut session = GridSession::open(engine, request, executor)
            .await
            .context("Failed to open grid session")?;
        session.run_until_idle().await;

        if let (Some(preferences), Some(view_id)) = (self.preferences.clone(), explicit_view) {
            let table = fixture.table.clone();
            tokio::task::spawn_blocking(move || preferences.remember_view(&table, &view_id))
                .await??;
        }
        Ok(session)
    }
}

fn current_grid(session: &GridSession) -> Result<&GridState> {
    let state = session.state();
    let Some(grid) = state.grid.as_ref() else {
        match &state.last_error {
            Some(error) => bail!("page failed to load: {}", error),
            None => bail!("the table has no views"),
        }
    };
    if let Some(error) = &grid.last_error {
        bail!("query failed: {}", error);
    }
    Ok(grid)
}

/// Table of the fetched rows followed by a count footer
pub fn render_table(engine: &GridEngine, grid: &GridState) -> String {
    let columns = grid.view.columns.len();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(grid.view.columns.iter().map(|column| column.name.as_str()));

    for row in grid.rows() {
        table.add_row((0..columns).map(|index| engine.format_cell(grid, row, index)));
    }

    format!(
        "{}\n{} of {} rows\n",
        table,
        grid.rows().len(),
        grid.total_row_count
    )
}

/// Parse a kind argument: a bare name, `enum:a,b`, `array:<kind>` or JSON
pub fn parse_kind(text: &str) -> Result<FieldKind> {
    let text = text.trim();
    if text.starts_with('{') {
        return serde_json::from_str(text).with_context(|| format!("Invalid kind JSON {:?}", text));
    }
    match text.split_once(':') {
        Some(("enum", values)) => Ok(FieldKind::enumeration(
            values.split(',').map(str::trim).filter(|value| !value.is_empty()),
        )),
        Some(("array", items)) => Ok(FieldKind::array_of(parse_kind(items)?)),
        Some(_) => bail!("unknown kind {:?}", text),
        None => serde_json::from_value(serde_json::json!({ "type": text }))
            .with_context(|| format!("unknown kind {:?}", text)),
    }
}

/// Compile `args.text` for `args.kind` and describe the outcome as JSON
pub fn check_filter(args: &CheckFilterArgs) -> Result<String> {
    let kind = parse_kind(&args.kind)?;
    let registry = TypeRegistry::standard();
    let report = compile_column(&registry, Some(&kind), &args.column, &args.text);
    let output = serde_json::json!({
        "kind": kind,
        "report": report,
        "query": report.detail(),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// File-backed preference storage, or none when it cannot be opened
pub fn open_preferences() -> Option<Arc<PreferenceStorage>> {
    let opened = tabula_settings::ensure_directories()
        .and_then(|()| tabula_settings::preferences_file())
        .and_then(|path| PreferenceStorage::open(path));
    match opened {
        Ok(storage) => Some(Arc::new(storage)),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "preferences unavailable, continuing without");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(kind: &str, text: &str) -> CheckFilterArgs {
        CheckFilterArgs {
            kind: kind.to_string(),
            text: text.to_string(),
            column: "total".to_string(),
        }
    }

    #[test]
    fn test_parse_kind_forms() {
        assert_eq!(parse_kind("money").unwrap(), FieldKind::Money);
        assert_eq!(parse_kind("datetime").unwrap(), FieldKind::DateTime);
        assert_eq!(
            parse_kind("enum:open, closed").unwrap(),
            FieldKind::enumeration(["open", "closed"])
        );
        assert_eq!(
            parse_kind("array:text").unwrap(),
            FieldKind::array_of(FieldKind::Text)
        );
        assert_eq!(parse_kind(r#"{"type": "boolean"}"#).unwrap(), FieldKind::Boolean);
        assert!(parse_kind("colour").is_err());
        assert!(parse_kind("map:text").is_err());
    }

    #[test]
    fn test_check_filter_reports_query_fragment() {
        let output: serde_json::Value =
            serde_json::from_str(&check_filter(&args("quantity", ">5")).unwrap()).unwrap();
        assert_eq!(output["kind"], serde_json::json!({"type": "quantity"}));
        assert_eq!(
            output["query"],
            serde_json::json!({"column": "total", "filter": {"greater": 5}})
        );
        assert_eq!(output["report"]["outcomes"][0]["outcome"], "compiled");
    }

    #[test]
    fn test_check_filter_flags_unparseable_text() {
        let output: serde_json::Value =
            serde_json::from_str(&check_filter(&args("money", "lots")).unwrap()).unwrap();
        assert_eq!(output["report"]["outcomes"][0]["outcome"], "unparseable");
        assert!(output["query"].is_null());
    }
}
