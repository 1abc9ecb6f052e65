use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::Frame;
use sqlpad_core::persistence::KeyValueStore;
use sqlpad_core::query_runner::{QueryBackend, QueryResponse, QueryState};
use sqlpad_core::schema_cache::SchemaState;

use crate::app::{row_count, Pane, ResultTab, TuiApp};
use crate::editor::{EditMode, EditorBuffer};

const MAX_COLUMN_WIDTH: usize = 32;
const COMPLETION_ROWS: usize = 8;
const COMPLETION_WIDTH: u16 = 44;

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

pub(crate) fn render<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
) {
    let layout = app.layout;
    render_header(frame, app, layout.header);
    render_tables(frame, app, layout.tables);
    render_editor(
        frame,
        app,
        layout.ddl,
        "Schema (DDL)",
        &app.ddl,
        app.pane == Pane::DdlEditor,
    );
    render_editor(
        frame,
        app,
        layout.query,
        "Query",
        &app.query,
        app.pane == Pane::QueryEditor,
    );
    render_results(frame, app, layout.results);
    render_footer(frame, app, layout.footer);

    if app.is_completing() {
        render_completion(frame, app);
    }
    if app.show_help {
        render_help_popup(frame);
    }
}

fn render_header<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
    area: Rect,
) {
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    let running = app.query_state.borrow().is_pending();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " SQL Playground ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Vim: {}", on_off(app.vim))),
        Span::raw(" | "),
        Span::raw(format!("Distributed: {}", on_off(app.distributed))),
        Span::raw(" | "),
        Span::raw(format!(
            "Query: {}",
            if running { "running" } else { "idle" }
        )),
    ]))
    .block(Block::default().borders(Borders::ALL).title("sqlpad"));
    frame.render_widget(header, area);
}

fn render_tables<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
    area: Rect,
) {
    let focused = app.pane == Pane::Tables;
    let mut cursor_line = 0_usize;
    let lines: Vec<Line<'_>> = match &*app.schema.borrow() {
        SchemaState::Loading => vec![Line::from("Loading tables...")],
        SchemaState::Error { message } => vec![Line::styled(
            format!("Error: {message}"),
            Style::default().fg(Color::Red),
        )],
        SchemaState::Loaded(catalog) if catalog.is_empty() => {
            vec![Line::from("No tables found")]
        }
        SchemaState::Loaded(catalog) => {
            let mut lines = Vec::new();
            for (index, table) in catalog.tables.iter().enumerate() {
                let expanded = app.expanded_tables.contains(&table.name);
                let selected = focused && index == app.tables_cursor;
                if selected {
                    cursor_line = lines.len();
                }
                let style = if selected {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default().add_modifier(Modifier::BOLD)
                };
                lines.push(Line::styled(
                    format!("{} {}", if expanded { "▾" } else { "▸" }, table.name),
                    style,
                ));
                if expanded {
                    for column in &table.columns {
                        lines.push(Line::from(vec![
                            Span::raw(format!("    {} ", column.name)),
                            Span::styled(
                                column.data_type.clone(),
                                Style::default().fg(Color::DarkGray),
                            ),
                        ]));
                    }
                }
            }
            lines
        }
    };

    let visible = usize::from(area.height.saturating_sub(2)).max(1);
    let scroll = cursor_line.saturating_sub(visible - 1);
    let tables = Paragraph::new(lines)
        .block(pane_block("Tables".to_string(), focused))
        .scroll((to_u16(scroll), 0));
    frame.render_widget(tables, area);
}

fn render_editor<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
    area: Rect,
    title: &str,
    editor: &EditorBuffer,
    focused: bool,
) {
    let mode = match (app.vim, editor.mode()) {
        (false, _) => "",
        (true, EditMode::Normal) => " [NORMAL]",
        (true, EditMode::Insert) => " [INSERT]",
    };
    let (line, column) = editor.cursor_position();
    let inner_height = area.height.saturating_sub(2).max(1);
    let scroll = to_u16(line).saturating_sub(inner_height - 1);

    let paragraph = Paragraph::new(editor.text())
        .block(pane_block(format!("{title}{mode}"), focused))
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);

    if focused && !app.show_help {
        let max_column = area.width.saturating_sub(3);
        frame.set_cursor_position(Position::new(
            area.x + 1 + to_u16(column).min(max_column),
            area.y + 1 + to_u16(line).saturating_sub(scroll),
        ));
    }
}

fn results_title(state: &QueryState) -> String {
    match state {
        QueryState::Succeeded(response) if response.is_truncated() => format!(
            "Results ({}, truncated by server)",
            row_count(response.rows.len() - 1)
        ),
        QueryState::Succeeded(response) => format!("Results ({})", row_count(response.rows.len())),
        QueryState::Idle | QueryState::Pending | QueryState::Failed { .. } => {
            "Results".to_string()
        }
    }
}

fn render_results<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
    area: Rect,
) {
    let state = app.query_state.borrow();
    let block = pane_block(results_title(&state), app.pane == Pane::Results);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [tabs_area, content] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(inner);
    let tabs = Tabs::new(ResultTab::ALL.iter().map(|tab| tab.title()))
        .select(app.result_tab.index())
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, tabs_area);

    let scroll = app.results_scroll;
    match &*state {
        QueryState::Idle => frame.render_widget(
            Paragraph::new("Press Ctrl+Enter (or F5) to run the query."),
            content,
        ),
        QueryState::Pending => frame.render_widget(Paragraph::new("Running..."), content),
        QueryState::Failed { message } => frame.render_widget(
            Paragraph::new(message.as_str())
                .style(Style::default().fg(Color::Red))
                .wrap(Wrap { trim: false }),
            content,
        ),
        QueryState::Succeeded(response) => match app.result_tab {
            ResultTab::Table => render_table(frame, response, content, scroll),
            ResultTab::LogicalPlan => {
                render_text(frame, response.logical_plan(), "No logical plan", content, scroll);
            }
            ResultTab::PhysicalPlan => render_text(
                frame,
                response.physical_plan(),
                "No physical plan",
                content,
                scroll,
            ),
            ResultTab::GraphvizSvg => render_graph_image(frame, response, content, scroll),
            ResultTab::GraphvizDot => {
                render_text(frame, response.graph_text(), "No graph", content, scroll);
            }
        },
    }
}

fn render_text(
    frame: &mut Frame<'_>,
    text: Option<&str>,
    placeholder: &str,
    area: Rect,
    scroll: usize,
) {
    let paragraph = match text {
        Some(text) => Paragraph::new(text).scroll((to_u16(scroll), 0)),
        None => Paragraph::new(placeholder).style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(paragraph, area);
}

fn render_graph_image(frame: &mut Frame<'_>, response: &QueryResponse, area: Rect, scroll: usize) {
    let text = match (&response.graph_image, response.graph_text()) {
        (Some(svg), _) => format!(
            "Rendered SVG ({} bytes). Press s to export it.\n\n{svg}",
            svg.len()
        ),
        (None, Some(_)) => {
            "Graph could not be rendered. Is Graphviz `dot` installed?".to_string()
        }
        (None, None) => "No graph".to_string(),
    };
    frame.render_widget(Paragraph::new(text).scroll((to_u16(scroll), 0)), area);
}

fn column_widths(response: &QueryResponse) -> Vec<Constraint> {
    response
        .columns
        .iter()
        .enumerate()
        .map(|(index, (name, _))| {
            let widest = response
                .rows
                .iter()
                .filter_map(|row| row.get(index))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or_default();
            Constraint::Length(to_u16(widest.min(MAX_COLUMN_WIDTH)))
        })
        .collect()
}

fn render_table(frame: &mut Frame<'_>, response: &QueryResponse, area: Rect, scroll: usize) {
    if response.columns.is_empty() {
        frame.render_widget(Paragraph::new("Statement returned no columns"), area);
        return;
    }
    let header = Row::new(response.column_names())
        .style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));
    let marker_index = response
        .is_truncated()
        .then(|| response.rows.len() - 1);
    let rows = response
        .rows
        .iter()
        .enumerate()
        .skip(scroll)
        .map(|(index, row)| {
            let style = if Some(index) == marker_index {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(row.clone()).style(style)
        });
    let table = Table::new(rows, column_widths(response))
        .header(header)
        .column_spacing(2);
    frame.render_widget(table, area);
}

fn render_footer<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
    area: Rect,
) {
    let hints = if app.is_editing() {
        "Ctrl+Enter/F5 run | Ctrl+Space complete | Ctrl+S share | Ctrl+D distributed | Ctrl+E vim | Tab next pane | F1 help"
    } else {
        "Ctrl+Enter/F5 run | 1-5 tabs | c/J/s export csv/json/svg | Enter expand | Ctrl+R refresh | Tab next pane | q quit"
    };
    let footer = Paragraph::new(vec![
        Line::from(hints),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Keys"));
    frame.render_widget(footer, area);
}

fn render_completion<B: QueryBackend + 'static, S: KeyValueStore>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B, S>,
) {
    let Some(popup) = &app.completion_popup else {
        return;
    };
    let (editor, area) = match app.pane {
        Pane::DdlEditor => (&app.ddl, app.layout.ddl),
        Pane::QueryEditor => (&app.query, app.layout.query),
        Pane::Tables | Pane::Results => return,
    };
    let (line, column) = editor.cursor_position();
    let first = popup.selected.saturating_sub(COMPLETION_ROWS - 1);
    let lines: Vec<Line<'_>> = popup
        .items
        .iter()
        .enumerate()
        .skip(first)
        .take(COMPLETION_ROWS)
        .map(|(index, item)| {
            let style = if index == popup.selected {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(item.label.clone(), style),
                Span::styled(
                    format!(" {}", item.detail.as_deref().unwrap_or("keyword")),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect();

    let height = to_u16(lines.len()) + 2;
    let popup_area = Rect::new(
        area.x.saturating_add(1).saturating_add(to_u16(column)),
        area.y.saturating_add(2).saturating_add(to_u16(line)),
        COMPLETION_WIDTH,
        height,
    )
    .intersection(frame.area());
    frame.render_widget(Clear, popup_area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Complete")),
        popup_area,
    );
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Execution"),
        Line::from("  Ctrl+Enter / F5: run DDL then query"),
        Line::from("  Ctrl+D: toggle distributed execution"),
        Line::from("Navigation"),
        Line::from("  Tab: cycle panes"),
        Line::from("  Ctrl+L / Ctrl+K: focus query / schema editor"),
        Line::from("  Mouse drag on a border: resize panels"),
        Line::from("Editing"),
        Line::from("  Ctrl+Space: complete tables, columns and keywords"),
        Line::from("  Ctrl+E: toggle vim mode (i a Esc h j k l x 0 $)"),
        Line::from("Results"),
        Line::from("  1-5 or Left/Right: switch tab, Up/Down: scroll"),
        Line::from("  c / J / s: export CSV / JSON / SVG"),
        Line::from("Other"),
        Line::from("  Ctrl+S: share link, Ctrl+R: reload tables"),
        Line::from("  q or Ctrl+Q: quit, F1 or Esc: close help"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Keyboard Shortcuts"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}
