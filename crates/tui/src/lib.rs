use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use sqlpad_adapters::export::ExportFormat;
use sqlpad_core::persistence::KeyValueStore;
use sqlpad_core::query_runner::QueryBackend;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

mod app;
mod editor;
mod render;

pub use app::PlaygroundSession;

use app::{DirectionKey, Msg, ResultTab, TuiApp};
use render::render;

const TICK_RATE: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Runs the playground until the user quits. Background work (queries,
/// schema refreshes, debounced writes) is spawned on `runtime`.
pub fn run<B: QueryBackend + 'static, S: KeyValueStore>(
    session: PlaygroundSession<B, S>,
    runtime: Handle,
) -> Result<(), TuiError> {
    let _guard = runtime.enter();
    let mut app = TuiApp::new(session, runtime.clone());

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);
    app.flush();
    info!("playground closed");

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B: QueryBackend + 'static, S: KeyValueStore>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut TuiApp<B, S>,
) -> Result<(), TuiError> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| {
            app.fit(frame.area());
            render(frame, app);
        })?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            let message = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    map_key_event(key, KeyContext::of(app))
                }
                Event::Mouse(mouse) => Some(Msg::Mouse(mouse)),
                _ => None,
            };
            if let Some(message) = message {
                app.handle(message);
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.handle(Msg::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KeyContext {
    editing: bool,
    completing: bool,
    help: bool,
}

impl KeyContext {
    fn of<B: QueryBackend + 'static, S: KeyValueStore>(app: &TuiApp<B, S>) -> Self {
        Self {
            editing: app.is_editing(),
            completing: app.is_completing(),
            help: app.show_help,
        }
    }
}

fn map_key_event(key: KeyEvent, context: KeyContext) -> Option<Msg> {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);

    if context.help {
        return match key.code {
            KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?') => Some(Msg::CloseOverlay),
            KeyCode::Char('q' | 'c') if control => Some(Msg::Quit),
            _ => None,
        };
    }

    match (control, key.code) {
        (_, KeyCode::F(5)) | (true, KeyCode::Enter) => return Some(Msg::Submit),
        (_, KeyCode::F(1)) => return Some(Msg::ToggleHelp),
        (true, KeyCode::Char('q' | 'c')) => return Some(Msg::Quit),
        (true, KeyCode::Char('l')) => return Some(Msg::FocusQueryEditor),
        (true, KeyCode::Char('k')) => return Some(Msg::FocusDdlEditor),
        (true, KeyCode::Char('e')) => return Some(Msg::ToggleVim),
        (true, KeyCode::Char('d')) => return Some(Msg::ToggleDistributed),
        (true, KeyCode::Char('s')) => return Some(Msg::Share),
        (true, KeyCode::Char('r')) => return Some(Msg::RefreshSchema),
        (true, KeyCode::Char(' ')) => return Some(Msg::Complete),
        _ => {}
    }

    if context.completing {
        match key.code {
            KeyCode::Up => return Some(Msg::CompletionMove(DirectionKey::Up)),
            KeyCode::Down => return Some(Msg::CompletionMove(DirectionKey::Down)),
            KeyCode::Enter | KeyCode::Tab => return Some(Msg::AcceptCompletion),
            KeyCode::Esc => return Some(Msg::CloseOverlay),
            _ => {}
        }
    }

    if key.code == KeyCode::Tab {
        return Some(Msg::NextPane);
    }
    if context.editing {
        return Some(Msg::Edit(key));
    }

    match key.code {
        KeyCode::Esc => Some(Msg::CloseOverlay),
        KeyCode::Char('q') => Some(Msg::Quit),
        KeyCode::Char('?') => Some(Msg::ToggleHelp),
        KeyCode::Enter => Some(Msg::Activate),
        KeyCode::Char('c') => Some(Msg::Export(ExportFormat::Csv)),
        KeyCode::Char('J') => Some(Msg::Export(ExportFormat::Json)),
        KeyCode::Char('s') => Some(Msg::Export(ExportFormat::Svg)),
        KeyCode::Up | KeyCode::Char('k') => Some(Msg::Navigate(DirectionKey::Up)),
        KeyCode::Down | KeyCode::Char('j') => Some(Msg::Navigate(DirectionKey::Down)),
        KeyCode::Left | KeyCode::Char('h') => Some(Msg::Navigate(DirectionKey::Left)),
        KeyCode::Right | KeyCode::Char('l') => Some(Msg::Navigate(DirectionKey::Right)),
        KeyCode::Char(digit @ '1'..='5') => digit
            .to_digit(10)
            .and_then(|slot| usize::try_from(slot).ok())
            .and_then(|slot| ResultTab::ALL.get(slot - 1).copied())
            .map(Msg::SelectTab),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use sqlpad_adapters::export::ExportFormat;

    use super::app::{DirectionKey, Msg, Pane, ResultTab};
    use super::{map_key_event, KeyContext};

    fn plain(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(character: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(character), KeyModifiers::CONTROL)
    }

    const BROWSING: KeyContext = KeyContext {
        editing: false,
        completing: false,
        help: false,
    };
    const EDITING: KeyContext = KeyContext {
        editing: true,
        completing: false,
        help: false,
    };

    #[test]
    fn pane_cycles_in_expected_order() {
        assert_eq!(Pane::Tables.next(), Pane::DdlEditor);
        assert_eq!(Pane::DdlEditor.next(), Pane::QueryEditor);
        assert_eq!(Pane::QueryEditor.next(), Pane::Results);
        assert_eq!(Pane::Results.next(), Pane::Tables);
    }

    #[test]
    fn keymap_supports_required_global_keys() {
        for context in [BROWSING, EDITING] {
            assert_eq!(map_key_event(plain(KeyCode::F(5)), context), Some(Msg::Submit));
            assert_eq!(
                map_key_event(
                    KeyEvent::new(KeyCode::Enter, KeyModifiers::CONTROL),
                    context
                ),
                Some(Msg::Submit)
            );
            assert_eq!(map_key_event(ctrl('q'), context), Some(Msg::Quit));
            assert_eq!(map_key_event(ctrl('s'), context), Some(Msg::Share));
            assert_eq!(map_key_event(ctrl('e'), context), Some(Msg::ToggleVim));
            assert_eq!(map_key_event(ctrl('d'), context), Some(Msg::ToggleDistributed));
            assert_eq!(map_key_event(plain(KeyCode::Tab), context), Some(Msg::NextPane));
            assert_eq!(map_key_event(ctrl('k'), context), Some(Msg::FocusDdlEditor));
            assert_eq!(map_key_event(ctrl('l'), context), Some(Msg::FocusQueryEditor));
        }
    }

    #[test]
    fn backspace_in_an_editor_never_switches_focus() {
        let backspace = plain(KeyCode::Backspace);
        assert_eq!(map_key_event(backspace, EDITING), Some(Msg::Edit(backspace)));
        assert_ne!(map_key_event(ctrl('h'), EDITING), Some(Msg::FocusDdlEditor));
    }

    #[test]
    fn editors_receive_plain_characters() {
        let key = plain(KeyCode::Char('q'));
        assert_eq!(map_key_event(key, EDITING), Some(Msg::Edit(key)));
        assert_eq!(map_key_event(key, BROWSING), Some(Msg::Quit));

        let enter = plain(KeyCode::Enter);
        assert_eq!(map_key_event(enter, EDITING), Some(Msg::Edit(enter)));
        assert_eq!(map_key_event(enter, BROWSING), Some(Msg::Activate));
    }

    #[test]
    fn completion_popup_captures_navigation_keys() {
        let completing = KeyContext {
            completing: true,
            ..EDITING
        };
        assert_eq!(
            map_key_event(plain(KeyCode::Down), completing),
            Some(Msg::CompletionMove(DirectionKey::Down))
        );
        assert_eq!(
            map_key_event(plain(KeyCode::Enter), completing),
            Some(Msg::AcceptCompletion)
        );
        assert_eq!(map_key_event(plain(KeyCode::Esc), completing), Some(Msg::CloseOverlay));
        assert_eq!(map_key_event(ctrl(' '), EDITING), Some(Msg::Complete));
    }

    #[test]
    fn result_tabs_and_exports_are_mapped_outside_editors() {
        assert_eq!(
            map_key_event(plain(KeyCode::Char('1')), BROWSING),
            Some(Msg::SelectTab(ResultTab::Table))
        );
        assert_eq!(
            map_key_event(plain(KeyCode::Char('5')), BROWSING),
            Some(Msg::SelectTab(ResultTab::GraphvizDot))
        );
        assert_eq!(map_key_event(plain(KeyCode::Char('6')), BROWSING), None);
        assert_eq!(
            map_key_event(plain(KeyCode::Char('J')), BROWSING),
            Some(Msg::Export(ExportFormat::Json))
        );
        assert_eq!(
            map_key_event(plain(KeyCode::Char('j')), BROWSING),
            Some(Msg::Navigate(DirectionKey::Down))
        );
    }

    #[test]
    fn help_overlay_swallows_other_keys() {
        let help = KeyContext {
            help: true,
            ..BROWSING
        };
        assert_eq!(map_key_event(plain(KeyCode::Esc), help), Some(Msg::CloseOverlay));
        assert_eq!(map_key_event(plain(KeyCode::Char('1')), help), None);
        assert_eq!(map_key_event(ctrl('q'), help), Some(Msg::Quit));
    }
}
