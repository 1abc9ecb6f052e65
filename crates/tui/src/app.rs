use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::{Constraint, Layout, Position, Rect};
use serde::Serialize;
use sqlpad_adapters::export::{export_response, ExportFormat};
use sqlpad_core::completion::{word_before_cursor, CompletionItem, CompletionProvider};
use sqlpad_core::persistence::{
    KeyValueStore, PersistedState, DDL_KEY, DISTRIBUTED_KEY, EDITOR_SPLIT_KEY, LAST_REQUEST_KEY,
    MID_BAR_POSITION_KEY, RESULT_TAB_KEY, STATEMENT_KEY, VIM_MODE_KEY,
};
use sqlpad_core::query_runner::{QueryBackend, QueryLifecycle, QueryState, QueryStateWatch};
use sqlpad_core::resize::SplitResize;
use sqlpad_core::samples::{SAMPLE_DDL, SAMPLE_SELECT};
use sqlpad_core::schema_cache::{SchemaDirectory, SchemaWatch};
use sqlpad_core::share::{share_url, ShareSnapshot};
use sqlpad_core::statements::QueryRequest;
use tokio::runtime::Handle;
use tracing::{info, warn};
use url::Url;

use crate::editor::EditorBuffer;

pub(crate) const TABLES_WIDTH: u16 = 28;
const MIN_PANEL_WIDTH: u16 = 20;
const MIN_EDITOR_HEIGHT: u16 = 3;
const DEFAULT_MID_BAR: u16 = 60;
const DEFAULT_EDITOR_SPLIT: u16 = 12;

/// Everything the interactive playground needs from the outside world.
pub struct PlaygroundSession<B: QueryBackend, S: KeyValueStore> {
    pub lifecycle: Arc<QueryLifecycle<B>>,
    pub schema: Arc<SchemaDirectory<B>>,
    pub persisted: Arc<PersistedState<S>>,
    pub share_base: Url,
    pub share_file: PathBuf,
    pub export_dir: PathBuf,
    pub startup_share: Option<ShareSnapshot>,
    /// Forces distributed execution on or off at startup, ahead of both the
    /// share link and the stored value.
    pub distributed_override: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pane {
    Tables,
    DdlEditor,
    QueryEditor,
    Results,
}

impl Pane {
    pub(crate) fn next(self) -> Self {
        match self {
            Self::Tables => Self::DdlEditor,
            Self::DdlEditor => Self::QueryEditor,
            Self::QueryEditor => Self::Results,
            Self::Results => Self::Tables,
        }
    }

    pub(crate) fn is_editor(self) -> bool {
        matches!(self, Self::DdlEditor | Self::QueryEditor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ResultTab {
    #[default]
    Table,
    LogicalPlan,
    PhysicalPlan,
    GraphvizSvg,
    GraphvizDot,
}

impl ResultTab {
    pub(crate) const ALL: [Self; 5] = [
        Self::Table,
        Self::LogicalPlan,
        Self::PhysicalPlan,
        Self::GraphvizSvg,
        Self::GraphvizDot,
    ];

    pub(crate) fn key(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::LogicalPlan => "logical",
            Self::PhysicalPlan => "physical",
            Self::GraphvizSvg => "graphviz_svg",
            Self::GraphvizDot => "graphviz",
        }
    }

    pub(crate) fn title(self) -> &'static str {
        match self {
            Self::Table => "Table",
            Self::LogicalPlan => "Logical Plan",
            Self::PhysicalPlan => "Physical Plan",
            Self::GraphvizSvg => "Graphviz SVG",
            Self::GraphvizDot => "Graphviz",
        }
    }

    pub(crate) fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tab| tab.key() == key)
    }

    pub(crate) fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|tab| *tab == self)
            .unwrap_or_default()
    }

    pub(crate) fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub(crate) fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirectionKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    FocusDdlEditor,
    FocusQueryEditor,
    Submit,
    ToggleVim,
    ToggleDistributed,
    Share,
    RefreshSchema,
    SelectTab(ResultTab),
    Export(ExportFormat),
    Complete,
    CompletionMove(DirectionKey),
    AcceptCompletion,
    CloseOverlay,
    Edit(KeyEvent),
    Navigate(DirectionKey),
    Activate,
    Mouse(MouseEvent),
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletionPopup {
    pub(crate) items: Vec<CompletionItem>,
    pub(crate) selected: usize,
    replace_len: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PanelLayout {
    pub(crate) header: Rect,
    pub(crate) tables: Rect,
    pub(crate) ddl: Rect,
    pub(crate) query: Rect,
    pub(crate) results: Rect,
    pub(crate) footer: Rect,
}

fn compute_layout(area: Rect, mid_bar: u16, editor_split: u16) -> PanelLayout {
    let [header, body, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(4),
    ])
    .areas(area);
    let [tables, editors, results] = Layout::horizontal([
        Constraint::Length(TABLES_WIDTH),
        Constraint::Length(mid_bar),
        Constraint::Min(MIN_PANEL_WIDTH),
    ])
    .areas(body);
    let [ddl, query] = Layout::vertical([
        Constraint::Length(editor_split),
        Constraint::Min(MIN_EDITOR_HEIGHT),
    ])
    .areas(editors);

    PanelLayout {
        header,
        tables,
        ddl,
        query,
        results,
        footer,
    }
}

pub(crate) struct TuiApp<B: QueryBackend + 'static, S: KeyValueStore> {
    runtime: Handle,
    lifecycle: Arc<QueryLifecycle<B>>,
    schema_directory: Arc<SchemaDirectory<B>>,
    persisted: Arc<PersistedState<S>>,
    completion: CompletionProvider,
    share_base: Url,
    share_file: PathBuf,
    export_dir: PathBuf,
    pub(crate) query_state: QueryStateWatch,
    pub(crate) schema: SchemaWatch,
    pub(crate) pane: Pane,
    pub(crate) ddl: EditorBuffer,
    pub(crate) query: EditorBuffer,
    pub(crate) vim: bool,
    pub(crate) distributed: bool,
    pub(crate) result_tab: ResultTab,
    pub(crate) results_scroll: usize,
    pub(crate) tables_cursor: usize,
    pub(crate) expanded_tables: BTreeSet<String>,
    pub(crate) completion_popup: Option<CompletionPopup>,
    pub(crate) mid_bar: SplitResize,
    pub(crate) editor_split: SplitResize,
    pub(crate) area: Rect,
    pub(crate) layout: PanelLayout,
    pub(crate) show_help: bool,
    pub(crate) should_quit: bool,
    pub(crate) status_line: String,
}

impl<B: QueryBackend + 'static, S: KeyValueStore> TuiApp<B, S> {
    pub(crate) fn new(session: PlaygroundSession<B, S>, runtime: Handle) -> Self {
        let PlaygroundSession {
            lifecycle,
            schema,
            persisted,
            share_base,
            share_file,
            export_dir,
            startup_share,
            distributed_override,
        } = session;

        let statement = persisted.init(
            STATEMENT_KEY,
            SAMPLE_SELECT.to_string(),
            startup_share.as_ref().map(|share| share.statement.clone()),
        );
        let ddl = persisted.init(
            DDL_KEY,
            SAMPLE_DDL.to_string(),
            startup_share.as_ref().and_then(|share| share.ddl.clone()),
        );
        let distributed = persisted.init(
            DISTRIBUTED_KEY,
            false,
            distributed_override.or(startup_share.as_ref().map(|share| share.distributed)),
        );
        let vim = persisted.read(VIM_MODE_KEY, false);
        let result_tab = ResultTab::from_key(
            &persisted.read(RESULT_TAB_KEY, ResultTab::Table.key().to_string()),
        )
        .unwrap_or_default();
        let mid_bar = persisted.read(MID_BAR_POSITION_KEY, DEFAULT_MID_BAR);
        let editor_split = persisted.read(EDITOR_SPLIT_KEY, DEFAULT_EDITOR_SPLIT);

        let status_line = if startup_share.is_some() {
            "Loaded shared query".to_string()
        } else {
            "Ctrl+Enter or F5 runs the query. F1 shows help.".to_string()
        };

        let app = Self {
            runtime,
            completion: CompletionProvider::new(schema.subscribe()),
            query_state: lifecycle.subscribe(),
            schema: schema.subscribe(),
            lifecycle,
            schema_directory: schema,
            persisted,
            share_base,
            share_file,
            export_dir,
            pane: Pane::QueryEditor,
            ddl: EditorBuffer::new(ddl, vim),
            query: EditorBuffer::new(statement, vim),
            vim,
            distributed,
            result_tab,
            results_scroll: 0,
            tables_cursor: 0,
            expanded_tables: BTreeSet::new(),
            completion_popup: None,
            mid_bar: SplitResize::new(mid_bar, MIN_PANEL_WIDTH, u16::MAX),
            editor_split: SplitResize::new(editor_split, MIN_EDITOR_HEIGHT, u16::MAX),
            area: Rect::default(),
            layout: PanelLayout::default(),
            show_help: false,
            should_quit: false,
            status_line,
        };
        app.refresh_schema();
        app
    }

    pub(crate) fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::NextPane => self.focus(self.pane.next()),
            Msg::FocusDdlEditor => self.focus(Pane::DdlEditor),
            Msg::FocusQueryEditor => self.focus(Pane::QueryEditor),
            Msg::Submit => self.submit(),
            Msg::ToggleVim => self.toggle_vim(),
            Msg::ToggleDistributed => {
                self.distributed = !self.distributed;
                self.persist(DISTRIBUTED_KEY, &self.distributed);
                self.status_line = format!(
                    "Distributed execution {}",
                    if self.distributed { "on" } else { "off" }
                );
            }
            Msg::Share => self.share(),
            Msg::RefreshSchema => {
                self.refresh_schema();
                self.status_line = "Refreshing tables...".to_string();
            }
            Msg::SelectTab(tab) => self.select_tab(tab),
            Msg::Export(format) => self.export(format),
            Msg::Complete => self.open_completion(),
            Msg::CompletionMove(direction) => self.move_completion(direction),
            Msg::AcceptCompletion => self.accept_completion(),
            Msg::CloseOverlay => {
                self.completion_popup = None;
                self.show_help = false;
            }
            Msg::Edit(key) => self.edit(key),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::Activate => self.activate(),
            Msg::Mouse(event) => self.on_mouse(event),
            Msg::Tick => self.on_tick(),
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        self.pane.is_editor()
    }

    pub(crate) fn is_completing(&self) -> bool {
        self.completion_popup.is_some()
    }

    /// Recomputes panel geometry for a terminal of size `area`.
    pub(crate) fn fit(&mut self, area: Rect) {
        self.area = area;
        let body_width = area.width.saturating_sub(TABLES_WIDTH);
        self.mid_bar
            .set_bounds(MIN_PANEL_WIDTH, body_width.saturating_sub(MIN_PANEL_WIDTH));
        let body_height = area.height.saturating_sub(7);
        self.editor_split
            .set_bounds(MIN_EDITOR_HEIGHT, body_height.saturating_sub(MIN_EDITOR_HEIGHT));
        self.relayout();
    }

    pub(crate) fn flush(&self) {
        if let Err(error) = self.persisted.flush() {
            warn!(%error, "failed to flush persisted state");
        }
    }

    fn relayout(&mut self) {
        self.layout = compute_layout(
            self.area,
            self.mid_bar.position(),
            self.editor_split.position(),
        );
    }

    fn focus(&mut self, pane: Pane) {
        self.pane = pane;
        self.completion_popup = None;
    }

    fn focused_editor(&self) -> Option<&EditorBuffer> {
        match self.pane {
            Pane::DdlEditor => Some(&self.ddl),
            Pane::QueryEditor => Some(&self.query),
            Pane::Tables | Pane::Results => None,
        }
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(error) = self.persisted.persist(key, value) {
            warn!(key, %error, "failed to persist value");
        }
    }

    fn persist_editor(&self, pane: Pane) {
        match pane {
            Pane::DdlEditor => self.persist(DDL_KEY, &self.ddl.text()),
            Pane::QueryEditor => self.persist(STATEMENT_KEY, &self.query.text()),
            Pane::Tables | Pane::Results => {}
        }
    }

    fn submit(&mut self) {
        let request = QueryRequest::from_sources([self.ddl.text(), self.query.text()])
            .with_distributed(self.distributed);
        if let Err(error) = self.persisted.persist(LAST_REQUEST_KEY, &request) {
            warn!(%error, "failed to persist last request");
        }
        info!(
            statements = request.stmts.len(),
            distributed = request.distributed,
            "running query"
        );

        let lifecycle = Arc::clone(&self.lifecycle);
        self.runtime.spawn(async move {
            lifecycle.execute(request).await;
        });
        self.completion_popup = None;
        self.results_scroll = 0;
        self.status_line = "Running query...".to_string();
    }

    fn refresh_schema(&self) {
        let directory = Arc::clone(&self.schema_directory);
        self.runtime.spawn(async move {
            directory.refresh().await;
        });
    }

    fn toggle_vim(&mut self) {
        self.vim = !self.vim;
        self.ddl.set_vim(self.vim);
        self.query.set_vim(self.vim);
        self.persist(VIM_MODE_KEY, &self.vim);
        self.status_line = format!("Vim mode {}", if self.vim { "on" } else { "off" });
    }

    fn select_tab(&mut self, tab: ResultTab) {
        self.result_tab = tab;
        self.results_scroll = 0;
        self.persist(RESULT_TAB_KEY, &tab.key());
    }

    fn share(&mut self) {
        let snapshot = ShareSnapshot {
            statement: self.query.text().to_string(),
            ddl: Some(self.ddl.text().to_string()),
            distributed: self.distributed,
        };
        let url = match share_url(&self.share_base, &snapshot) {
            Ok(url) => url.to_string(),
            Err(error) => {
                self.status_line = format!("Share failed: {error}");
                return;
            }
        };

        self.status_line = match fs::write(&self.share_file, format!("{url}\n")) {
            Ok(()) => format!("Share URL: {url}"),
            Err(error) => {
                warn!(path = %self.share_file.display(), %error, "failed to write share url");
                format!("Share URL: {url} (not saved: {error})")
            }
        };
    }

    fn export(&mut self, format: ExportFormat) {
        let path = format.default_path(&self.export_dir);
        let outcome = {
            let state = self.query_state.borrow();
            state
                .response()
                .map(|response| export_response(&path, format, response))
        };
        self.status_line = match outcome {
            None => "No results to export".to_string(),
            Some(Ok(count)) => format!(
                "Exported {count} {} to {}",
                if format == ExportFormat::Svg { "graph" } else { "rows" },
                path.display()
            ),
            Some(Err(error)) => format!("Export failed: {error}"),
        };
    }

    fn open_completion(&mut self) {
        let Some(editor) = self.focused_editor() else {
            return;
        };
        let word = word_before_cursor(editor.text(), editor.cursor());
        let replace_len = word
            .rsplit_once('.')
            .map_or(word.len(), |(_, column)| column.len());
        let items = self.completion.suggest(word, self.ddl.text());

        if items.is_empty() {
            self.status_line = "No completions".to_string();
            self.completion_popup = None;
            return;
        }
        self.completion_popup = Some(CompletionPopup {
            items,
            selected: 0,
            replace_len,
        });
    }

    fn move_completion(&mut self, direction: DirectionKey) {
        let Some(popup) = &mut self.completion_popup else {
            return;
        };
        let last = popup.items.len().saturating_sub(1);
        popup.selected = match direction {
            DirectionKey::Up | DirectionKey::Left => popup.selected.saturating_sub(1),
            DirectionKey::Down | DirectionKey::Right => (popup.selected + 1).min(last),
        };
    }

    fn accept_completion(&mut self) {
        let Some(popup) = self.completion_popup.take() else {
            return;
        };
        let Some(item) = popup.items.get(popup.selected) else {
            return;
        };
        let pane = self.pane;
        let editor = match pane {
            Pane::DdlEditor => &mut self.ddl,
            Pane::QueryEditor => &mut self.query,
            Pane::Tables | Pane::Results => return,
        };
        editor.replace_before_cursor(popup.replace_len, &item.label);
        self.persist_editor(pane);
    }

    fn edit(&mut self, key: KeyEvent) {
        self.completion_popup = None;
        let pane = self.pane;
        let changed = match pane {
            Pane::DdlEditor => self.ddl.handle_key(key),
            Pane::QueryEditor => self.query.handle_key(key),
            Pane::Tables | Pane::Results => false,
        };
        if changed {
            self.persist_editor(pane);
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        match self.pane {
            Pane::Tables => self.navigate_tables(direction),
            Pane::Results => match direction {
                DirectionKey::Up => self.results_scroll = self.results_scroll.saturating_sub(1),
                DirectionKey::Down => self.scroll_results_down(1),
                DirectionKey::Left => self.select_tab(self.result_tab.previous()),
                DirectionKey::Right => self.select_tab(self.result_tab.next()),
            },
            Pane::DdlEditor | Pane::QueryEditor => {}
        }
    }

    fn scroll_results_down(&mut self, rows: usize) {
        let row_count = self
            .query_state
            .borrow()
            .response()
            .map_or(0, |response| response.rows.len());
        self.results_scroll = (self.results_scroll + rows).min(row_count.saturating_sub(1));
    }

    pub(crate) fn table_names(&self) -> Vec<String> {
        self.schema.borrow().catalog().table_names()
    }

    fn navigate_tables(&mut self, direction: DirectionKey) {
        let names = self.table_names();
        if names.is_empty() {
            return;
        }
        match direction {
            DirectionKey::Up => self.tables_cursor = self.tables_cursor.saturating_sub(1),
            DirectionKey::Down => {
                self.tables_cursor = (self.tables_cursor + 1).min(names.len() - 1);
            }
            DirectionKey::Left => {
                if let Some(name) = names.get(self.tables_cursor) {
                    self.expanded_tables.remove(name);
                }
            }
            DirectionKey::Right => {
                if let Some(name) = names.get(self.tables_cursor) {
                    self.expanded_tables.insert(name.clone());
                }
            }
        }
    }

    fn activate(&mut self) {
        if self.pane != Pane::Tables {
            return;
        }
        let names = self.table_names();
        let Some(name) = names.get(self.tables_cursor) else {
            return;
        };
        if !self.expanded_tables.remove(name) {
            self.expanded_tables.insert(name.clone());
        }
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        let point = Position::new(event.column, event.row);
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if self.on_mid_bar(point) {
                    self.mid_bar.pointer_down(event.column);
                } else if self.on_editor_split(point) {
                    self.editor_split.pointer_down(event.row);
                } else if let Some(pane) = self.pane_at(point) {
                    self.focus(pane);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let moved_mid = self.mid_bar.pointer_move(event.column).is_some();
                let moved_split = self.editor_split.pointer_move(event.row).is_some();
                if moved_mid || moved_split {
                    self.relayout();
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(position) = self.mid_bar.pointer_up() {
                    self.persist(MID_BAR_POSITION_KEY, &position);
                }
                if let Some(position) = self.editor_split.pointer_up() {
                    self.persist(EDITOR_SPLIT_KEY, &position);
                }
            }
            MouseEventKind::ScrollDown if self.layout.results.contains(point) => {
                self.scroll_results_down(3);
            }
            MouseEventKind::ScrollUp if self.layout.results.contains(point) => {
                self.results_scroll = self.results_scroll.saturating_sub(3);
            }
            _ => {}
        }
    }

    fn on_mid_bar(&self, point: Position) -> bool {
        let results = self.layout.results;
        let within_body = point.y >= results.y && point.y < results.bottom();
        within_body && (point.x == results.x || point.x + 1 == results.x)
    }

    fn on_editor_split(&self, point: Position) -> bool {
        let query = self.layout.query;
        let within_editors = point.x >= query.x && point.x < query.right();
        within_editors && (point.y == query.y || point.y + 1 == query.y)
    }

    fn pane_at(&self, point: Position) -> Option<Pane> {
        [
            (self.layout.tables, Pane::Tables),
            (self.layout.ddl, Pane::DdlEditor),
            (self.layout.query, Pane::QueryEditor),
            (self.layout.results, Pane::Results),
        ]
        .into_iter()
        .find_map(|(area, pane)| area.contains(point).then_some(pane))
    }

    fn on_tick(&mut self) {
        if self.query_state.has_changed().unwrap_or(false) {
            let status = describe_query_state(&self.query_state.borrow_and_update());
            if let Some(status) = status {
                self.status_line = status;
            }
        }
        if self.schema.has_changed().unwrap_or(false) {
            let table_count = self.schema.borrow_and_update().catalog().tables.len();
            self.tables_cursor = self.tables_cursor.min(table_count.saturating_sub(1));
        }
    }
}

fn describe_query_state(state: &QueryState) -> Option<String> {
    match state {
        QueryState::Idle => None,
        QueryState::Pending => Some("Running query...".to_string()),
        QueryState::Failed { message } => Some(format!("Query failed: {message}")),
        QueryState::Succeeded(response) => {
            let truncated = response.is_truncated();
            let rows = response.rows.len() - usize::from(truncated);
            Some(if truncated {
                format!(
                    "Query returned the first {} (truncated by server)",
                    row_count(rows)
                )
            } else {
                format!("Query returned {}", row_count(rows))
            })
        }
    }
}

pub(crate) fn row_count(rows: usize) -> String {
    if rows == 1 {
        "1 row".to_string()
    } else {
        format!("{rows} rows")
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use crossterm::event::{
        KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    };
    use ratatui::layout::Rect;
    use sqlpad_core::persistence::{
        MemoryKeyValueStore, PersistedState, DDL_KEY, DISTRIBUTED_KEY, LAST_REQUEST_KEY,
        MID_BAR_POSITION_KEY, RESULT_TAB_KEY, STATEMENT_KEY, VIM_MODE_KEY,
    };
    use sqlpad_core::query_runner::{
        QueryBackend, QueryBackendError, QueryLifecycle, QueryResponse, QueryState,
    };
    use sqlpad_core::samples::{SAMPLE_DDL, SAMPLE_SELECT};
    use sqlpad_core::schema_cache::{SchemaDirectory, INTROSPECTION_SQL};
    use sqlpad_core::share::{snapshot_from_input, ShareSnapshot};
    use sqlpad_core::statements::QueryRequest;
    use tempfile::TempDir;
    use tokio::runtime::Handle;
    use url::Url;

    use super::{
        describe_query_state, DirectionKey, Msg, Pane, PlaygroundSession, ResultTab, TuiApp,
    };

    #[derive(Clone, Default)]
    struct RecordingBackend {
        requests: Arc<Mutex<Vec<QueryRequest>>>,
    }

    impl RecordingBackend {
        fn requests(&self) -> Vec<QueryRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl QueryBackend for RecordingBackend {
        async fn execute(
            &self,
            request: &QueryRequest,
        ) -> Result<QueryResponse, QueryBackendError> {
            if request.stmts == [INTROSPECTION_SQL] {
                return Ok(QueryResponse {
                    columns: vec![
                        ("table_name".to_string(), "Utf8".to_string()),
                        ("column_name".to_string(), "Utf8".to_string()),
                        ("data_type".to_string(), "Utf8".to_string()),
                    ],
                    rows: vec![vec![
                        "employees".to_string(),
                        "id".to_string(),
                        "Int64".to_string(),
                    ]],
                    ..QueryResponse::default()
                });
            }
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            Ok(QueryResponse {
                columns: vec![("n".to_string(), "Int64".to_string())],
                rows: vec![vec!["1".to_string()]],
                ..QueryResponse::default()
            })
        }
    }

    struct Harness {
        app: TuiApp<RecordingBackend, MemoryKeyValueStore>,
        backend: RecordingBackend,
        lifecycle: Arc<QueryLifecycle<RecordingBackend>>,
        store: Arc<MemoryKeyValueStore>,
    }

    fn harness(
        store: MemoryKeyValueStore,
        startup_share: Option<ShareSnapshot>,
        share_dir: &Path,
    ) -> Harness {
        harness_with_override(store, startup_share, share_dir, None)
    }

    fn harness_with_override(
        store: MemoryKeyValueStore,
        startup_share: Option<ShareSnapshot>,
        share_dir: &Path,
        distributed_override: Option<bool>,
    ) -> Harness {
        let backend = RecordingBackend::default();
        let lifecycle = Arc::new(QueryLifecycle::new(backend.clone()));
        let store = Arc::new(store);
        let session = PlaygroundSession {
            lifecycle: Arc::clone(&lifecycle),
            schema: Arc::new(SchemaDirectory::new(backend.clone())),
            persisted: Arc::new(PersistedState::new(Arc::clone(&store))),
            share_base: Url::parse("https://play.example/").expect("valid url"),
            share_file: share_dir.join("share-url.txt"),
            export_dir: share_dir.to_path_buf(),
            startup_share,
            distributed_override,
        };
        let mut app = TuiApp::new(session, Handle::current());
        app.fit(Rect::new(0, 0, 160, 40));
        Harness {
            app,
            backend,
            lifecycle,
            store,
        }
    }

    fn key(code: KeyCode) -> Msg {
        Msg::Edit(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Msg {
        Msg::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn query_status_pluralises_row_counts() {
        let succeeded = |rows: &[&str]| {
            QueryState::Succeeded(QueryResponse {
                columns: vec![("n".to_string(), "Int64".to_string())],
                rows: rows.iter().map(|cell| vec![(*cell).to_string()]).collect(),
                ..QueryResponse::default()
            })
        };

        assert_eq!(
            describe_query_state(&succeeded(&["1"])).as_deref(),
            Some("Query returned 1 row")
        );
        assert_eq!(
            describe_query_state(&succeeded(&[])).as_deref(),
            Some("Query returned 0 rows")
        );
        assert_eq!(
            describe_query_state(&succeeded(&["1", "2", "..."])).as_deref(),
            Some("Query returned the first 2 rows (truncated by server)")
        );
        assert_eq!(
            describe_query_state(&succeeded(&["1", "..."])).as_deref(),
            Some("Query returned the first 1 row (truncated by server)")
        );
    }

    #[tokio::test]
    async fn starts_from_samples_and_persisted_preferences() {
        let dir = TempDir::new().expect("temp dir");
        let store = MemoryKeyValueStore::default()
            .with_entry(VIM_MODE_KEY, "true")
            .with_entry(RESULT_TAB_KEY, "\"physical\"");
        let Harness { app, .. } = harness(store, None, dir.path());

        assert_eq!(app.query.text(), SAMPLE_SELECT);
        assert_eq!(app.ddl.text(), SAMPLE_DDL);
        assert!(app.vim);
        assert_eq!(app.result_tab, ResultTab::PhysicalPlan);
        assert_eq!(app.pane, Pane::QueryEditor);
    }

    #[tokio::test]
    async fn startup_share_overrides_editors_but_stores_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let shared = ShareSnapshot {
            statement: "SELECT 42".to_string(),
            ddl: Some("CREATE TABLE t (a INT)".to_string()),
            distributed: true,
        };
        let Harness { app, store, .. } = harness(
            MemoryKeyValueStore::default(),
            Some(shared),
            dir.path(),
        );

        assert_eq!(app.query.text(), "SELECT 42");
        assert_eq!(app.ddl.text(), "CREATE TABLE t (a INT)");
        assert!(app.distributed);
        assert_eq!(
            store.raw(STATEMENT_KEY),
            Some(serde_json::to_string(SAMPLE_SELECT).expect("json"))
        );
        assert_eq!(store.raw(DISTRIBUTED_KEY), Some("false".to_string()));
        assert_eq!(app.status_line, "Loaded shared query");
    }

    #[tokio::test]
    async fn distributed_override_beats_stored_value_and_share_link() {
        let dir = TempDir::new().expect("temp dir");
        let stored = || MemoryKeyValueStore::default().with_entry(DISTRIBUTED_KEY, "false");

        let Harness { app, .. } = harness_with_override(stored(), None, dir.path(), Some(true));
        assert!(app.distributed);

        let shared = ShareSnapshot::new("SELECT 1");
        let Harness { app, .. } =
            harness_with_override(stored(), Some(shared), dir.path(), Some(true));
        assert!(app.distributed);

        let Harness { app, .. } = harness_with_override(stored(), None, dir.path(), None);
        assert!(!app.distributed);
    }

    #[tokio::test]
    async fn submit_sends_ddl_then_query_and_records_last_request() {
        let dir = TempDir::new().expect("temp dir");
        let shared = ShareSnapshot {
            statement: "SELECT a FROM t;".to_string(),
            ddl: Some("CREATE TABLE t (a INT);".to_string()),
            distributed: false,
        };
        let Harness {
            mut app,
            backend,
            lifecycle,
            store,
        } = harness(MemoryKeyValueStore::default(), Some(shared), dir.path());

        app.handle(Msg::ToggleDistributed);
        app.handle(Msg::Submit);
        assert_eq!(app.status_line, "Running query...");

        let mut watch = lifecycle.subscribe();
        watch
            .wait_for(|state| matches!(state, QueryState::Succeeded(_)))
            .await
            .expect("lifecycle alive");
        app.handle(Msg::Tick);
        app.flush();

        let expected = QueryRequest::new(vec![
            "CREATE TABLE t (a INT)".to_string(),
            "SELECT a FROM t".to_string(),
        ])
        .with_distributed(true);
        assert_eq!(backend.requests(), vec![expected.clone()]);
        assert_eq!(app.status_line, "Query returned 1 row");
        let stored: QueryRequest = serde_json::from_str(
            &store.raw(LAST_REQUEST_KEY).expect("last request stored"),
        )
        .expect("stored request is json");
        assert_eq!(stored, expected);
        assert_eq!(store.raw(DISTRIBUTED_KEY), Some("true".to_string()));
    }

    #[tokio::test]
    async fn result_tab_selection_is_persisted_and_cycles() {
        let dir = TempDir::new().expect("temp dir");
        let Harness {
            mut app, store, ..
        } = harness(MemoryKeyValueStore::default(), None, dir.path());

        app.handle(Msg::SelectTab(ResultTab::GraphvizSvg));
        app.pane = Pane::Results;
        app.handle(Msg::Navigate(DirectionKey::Right));
        assert_eq!(app.result_tab, ResultTab::GraphvizDot);
        app.handle(Msg::Navigate(DirectionKey::Right));
        assert_eq!(app.result_tab, ResultTab::Table);
        app.handle(Msg::Navigate(DirectionKey::Left));
        assert_eq!(app.result_tab, ResultTab::GraphvizDot);

        app.flush();
        assert_eq!(store.raw(RESULT_TAB_KEY), Some("\"graphviz\"".to_string()));
    }

    #[tokio::test]
    async fn vim_toggle_switches_both_editors() {
        let dir = TempDir::new().expect("temp dir");
        let Harness {
            mut app, store, ..
        } = harness(MemoryKeyValueStore::default(), None, dir.path());

        app.handle(Msg::ToggleVim);
        let before = app.query.text().to_string();
        app.handle(key(KeyCode::Char('x')));

        assert!(app.vim);
        assert_eq!(app.query.text(), &before[1..]);
        app.flush();
        assert_eq!(store.raw(VIM_MODE_KEY), Some("true".to_string()));
        assert_eq!(
            store.raw(STATEMENT_KEY),
            Some(serde_json::to_string(&before[1..]).expect("json"))
        );
    }

    #[tokio::test]
    async fn typing_persists_editor_text() {
        let dir = TempDir::new().expect("temp dir");
        let shared = ShareSnapshot {
            statement: String::new(),
            ddl: None,
            distributed: false,
        };
        let Harness {
            mut app, store, ..
        } = harness(MemoryKeyValueStore::default(), Some(shared), dir.path());

        app.handle(key(KeyCode::Char('1')));
        app.handle(Msg::FocusDdlEditor);
        app.handle(key(KeyCode::Char('-')));
        app.flush();

        assert_eq!(store.raw(STATEMENT_KEY), Some("\"1\"".to_string()));
        let ddl = store.raw(DDL_KEY).expect("ddl stored");
        assert!(ddl.starts_with("\"-"));
    }

    #[tokio::test]
    async fn accepting_a_completion_replaces_the_word() {
        let dir = TempDir::new().expect("temp dir");
        let shared = ShareSnapshot {
            statement: "SELECT * FROM emp".to_string(),
            ddl: Some("CREATE TABLE employees (id INT)".to_string()),
            distributed: false,
        };
        let Harness { mut app, .. } =
            harness(MemoryKeyValueStore::default(), Some(shared), dir.path());

        app.handle(key(KeyCode::End));
        app.handle(Msg::Complete);
        let popup = app.completion_popup.as_ref().expect("completion popup");
        assert_eq!(popup.items[0].label, "employees");

        app.handle(Msg::AcceptCompletion);
        assert_eq!(app.query.text(), "SELECT * FROM employees");
        assert!(app.completion_popup.is_none());
    }

    #[tokio::test]
    async fn dragging_the_mid_bar_resizes_and_persists_on_release() {
        let dir = TempDir::new().expect("temp dir");
        let Harness {
            mut app, store, ..
        } = harness(MemoryKeyValueStore::default(), None, dir.path());
        let bar = app.layout.results.x;
        let row = app.layout.results.y + 2;

        app.handle(mouse(MouseEventKind::Down(MouseButton::Left), bar, row));
        app.handle(mouse(MouseEventKind::Drag(MouseButton::Left), bar + 10, row));
        assert_eq!(app.mid_bar.position(), 70);
        assert_eq!(app.layout.results.x, bar + 10);
        assert_eq!(store.raw(MID_BAR_POSITION_KEY), None);

        app.handle(mouse(MouseEventKind::Drag(MouseButton::Left), 500, row));
        assert_eq!(app.mid_bar.position(), 112);

        app.handle(mouse(MouseEventKind::Up(MouseButton::Left), 500, row));
        app.flush();
        assert_eq!(store.raw(MID_BAR_POSITION_KEY), Some("112".to_string()));
    }

    #[tokio::test]
    async fn clicking_a_pane_focuses_it() {
        let dir = TempDir::new().expect("temp dir");
        let Harness { mut app, .. } = harness(MemoryKeyValueStore::default(), None, dir.path());

        let tables = app.layout.tables;
        app.handle(mouse(
            MouseEventKind::Down(MouseButton::Left),
            tables.x + 2,
            tables.y + 2,
        ));
        assert_eq!(app.pane, Pane::Tables);
    }

    #[tokio::test]
    async fn loaded_tables_expand_and_collapse() {
        let dir = TempDir::new().expect("temp dir");
        let Harness { mut app, .. } = harness(MemoryKeyValueStore::default(), None, dir.path());

        app.schema
            .wait_for(|state| !state.catalog().is_empty())
            .await
            .expect("schema loaded");
        app.handle(Msg::Tick);
        app.pane = Pane::Tables;

        app.handle(Msg::Activate);
        assert!(app.expanded_tables.contains("employees"));
        app.handle(Msg::Navigate(DirectionKey::Left));
        assert!(app.expanded_tables.is_empty());
        app.handle(Msg::Navigate(DirectionKey::Right));
        assert!(app.expanded_tables.contains("employees"));
    }

    #[tokio::test]
    async fn share_writes_url_that_decodes_to_editor_contents() {
        let dir = TempDir::new().expect("temp dir");
        let shared = ShareSnapshot {
            statement: "SELECT 1".to_string(),
            ddl: Some("CREATE TABLE t (a INT)".to_string()),
            distributed: true,
        };
        let Harness { mut app, .. } =
            harness(MemoryKeyValueStore::default(), Some(shared.clone()), dir.path());

        app.handle(Msg::Share);

        let written =
            std::fs::read_to_string(dir.path().join("share-url.txt")).expect("share file");
        assert!(written.starts_with("https://play.example/?q="));
        assert_eq!(snapshot_from_input(written.trim()), Some(shared));
        assert!(app.status_line.starts_with("Share URL: https://play.example/"));
    }

    #[tokio::test]
    async fn export_without_results_reports_it() {
        let dir = TempDir::new().expect("temp dir");
        let Harness { mut app, .. } = harness(MemoryKeyValueStore::default(), None, dir.path());

        app.handle(Msg::Export(sqlpad_adapters::export::ExportFormat::Csv));
        assert_eq!(app.status_line, "No results to export");
    }
}
