use chrono::Utc;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind};
use futures::StreamExt;
use ratatui::{prelude::*, widgets::*};
use std::{io, time::Duration};
use tokio::sync::mpsc;

use crate::app::cache::MutationKind;
use crate::app::models::Task;
use crate::app::sync::{SyncEvent, TodoSync};
use crate::app::{task_input::*, task_list::*};

pub struct App {
    pub sync: TodoSync,
    pub list: TaskList,
    pub input: TaskInputState,
}

impl App {
    pub fn new(sync: TodoSync) -> App {
        App {
            sync,
            list: TaskList::default(),
            input: TaskInputState::default(),
        }
    }

    fn tasks(&self) -> &[Task] {
        self.sync
            .cache()
            .read(&self.sync.list_key())
            .data
            .unwrap_or_default()
    }

    fn selected_task(&self) -> Option<Task> {
        let tasks = self.tasks();
        self.list
            .selected(tasks.len())
            .and_then(|i| tasks.get(i))
            .cloned()
    }

    // Handles one key press. Returns false when the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if self.input.dialog_active {
            // Handle input for the task input form
            match key.code {
                KeyCode::Down => self.input.move_cursor_down(),
                KeyCode::Up => self.input.move_cursor_up(),
                KeyCode::Esc => self.input.cancel(),
                KeyCode::Enter => {
                    if let Some(todo) = self.input.submit() {
                        self.sync.create(todo);
                    }
                }
                KeyCode::Left => self.input.move_cursor_left(),
                KeyCode::Right => self.input.move_cursor_right(),
                KeyCode::Backspace => self.input.delete_char(),
                KeyCode::Char(to_insert) => self.input.input(to_insert),
                _ => {}
            }
            return true;
        }

        // Handle input for the task list navigation and mutations
        let len = self.tasks().len();
        match key.code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('a') => self.input.open(),
            KeyCode::Char('r') => self.sync.refresh(),
            KeyCode::Char('x') => {
                if let Some(task) = self.selected_task() {
                    self.sync.delete(task.id);
                }
            }
            KeyCode::Enter => {
                if let Some(task) = self.selected_task() {
                    self.sync.toggle(&task);
                }
            }
            KeyCode::Char('c') => {
                if let Some(task) = self.selected_task() {
                    self.sync.complete(&task);
                }
            }
            KeyCode::Left => self.list.unselect(),
            KeyCode::Down => self.list.next(len),
            KeyCode::Up => self.list.previous(len),
            _ => {}
        }
        true
    }
}

pub async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut sync_events: mpsc::UnboundedReceiver<SyncEvent>,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut terminal_events = EventStream::new();
    let mut ticker = tokio::time::interval(tick_rate);
    app.sync.ensure_todos();

    loop {
        terminal.draw(|f| draw_ui(f, &app))?;

        tokio::select! {
            event = terminal_events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if !app.handle_key(key) {
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err),
                None => return Ok(()),
            },
            Some(event) = sync_events.recv() => app.sync.apply(event),
            _ = ticker.tick() => {}
        }
    }
}

// Draws the whole user interface
fn draw_ui(f: &mut Frame, app: &App) {
    // List and side panel on top, one status line at the bottom
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.size());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[0]);

    // DRAW LEFT PART
    let view = TodoListView::from_cache(app.sync.cache(), &app.sync.list_key());
    let list_block = Block::default().borders(Borders::ALL).title("Todos");
    if let TodoListView::Failed(message) = &view {
        let error = Paragraph::new(format!("Error: {message}"))
            .block(list_block)
            .style(Style::new().red())
            .wrap(Wrap { trim: true });
        f.render_widget(error, chunks[0]);
    } else {
        let mut state = app
            .list
            .render_state(view.provisional_count(), view.entries().len());
        let task_list = List::new(get_list_items_ui(&view))
            .block(list_block)
            .highlight_style(
                Style::default()
                    .bg(Color::LightGreen)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");
        f.render_stateful_widget(task_list, chunks[0], &mut state);
    }

    // DRAW RIGHT PART
    let adding = app.sync.cache().pending_count(MutationKind::Create) > 0;
    if app.input.dialog_active {
        let input = Paragraph::new(get_task_input_ui(&app.input, adding))
            .block(Block::new().title("Add Todo").borders(Borders::ALL))
            .style(Style::new().white());

        f.render_widget(input, chunks[1]);
    } else {
        // If not typing, display instructions and statistics in vertically split layout
        let right_side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);

        let instructions = Paragraph::new(get_instructions_ui())
            .block(Block::new().title("Commands").borders(Borders::ALL))
            .style(Style::new().white());

        let stats = TaskStatistics::from_tasks(app.tasks(), Utc::now());
        let statistics = Paragraph::new(get_statistics_ui(&stats))
            .block(Block::new().title("Statistics").borders(Borders::ALL))
            .style(Style::new().white());

        f.render_widget(instructions, right_side[0]);
        f.render_widget(statistics, right_side[1]);
    }

    f.render_widget(Paragraph::new(status_line(app)), rows[1]);
}

fn status_line(app: &App) -> Line<'_> {
    let cache = app.sync.cache();
    let snapshot = cache.read(&app.sync.list_key());
    let mut spans = vec![Span::from(format!(" user {}", app.sync.user()))];

    if let Some(updated_at) = snapshot.updated_at {
        let synced = updated_at.format("%H:%M:%S");
        spans.push(Span::from(format!(" | synced {synced}")));
    }
    if snapshot.is_fetching || cache.has_pending_mutations() {
        spans.push(Span::from(" | syncing..."));
    }
    // Errors on refetch or mutation, while a list is already on screen
    if let (Some(_), Some(error)) = (snapshot.data, snapshot.error) {
        spans.push(Span::styled(
            format!(" | refresh failed: {error}"),
            Style::new().red(),
        ));
    } else if let Some(error) = cache.last_mutation_error() {
        spans.push(Span::styled(
            format!(" | last change failed: {error}"),
            Style::new().red(),
        ));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::api::TodoApi;
    use crate::app::models::UserId;
    use crate::app::sync::testing::InMemoryTodoApi;
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    const USER: UserId = UserId(3);

    fn press(app: &mut App, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    async fn drain(app: &mut App, events: &mut mpsc::UnboundedReceiver<SyncEvent>) {
        app.sync.ensure_todos();
        while app.sync.cache().read(&app.sync.list_key()).is_fetching
            || app.sync.cache().has_pending_mutations()
        {
            let event = events.recv().await.unwrap();
            app.sync.apply(event);
        }
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| draw_ui(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol.as_str())
            .collect()
    }

    async fn app_with(api: &Arc<InMemoryTodoApi>) -> (App, mpsc::UnboundedReceiver<SyncEvent>) {
        let dyn_api: Arc<dyn TodoApi> = api.clone();
        let (sync, events) = TodoSync::new(dyn_api, USER, None);
        (App::new(sync), events)
    }

    #[tokio::test]
    async fn typing_a_name_and_enter_creates_a_task() {
        let api = Arc::new(InMemoryTodoApi::default());
        let (mut app, mut events) = app_with(&api).await;
        drain(&mut app, &mut events).await;

        press(&mut app, KeyCode::Char('a'));
        assert!(app.input.dialog_active);
        type_text(&mut app, "Buy milk");
        press(&mut app, KeyCode::Enter);

        assert!(!app.input.dialog_active);
        assert_eq!(app.sync.cache().pending_creations(), vec!["Buy milk"]);
        assert!(screen(&app).contains("Buy milk"));

        drain(&mut app, &mut events).await;
        assert!(app.sync.cache().pending_creations().is_empty());
        assert_eq!(app.tasks()[0].name, "Buy milk");
    }

    #[tokio::test]
    async fn enter_toggles_and_x_deletes_the_selection() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.seed(USER, "first", false).await;
        api.seed(USER, "second", false).await;
        let (mut app, mut events) = app_with(&api).await;
        drain(&mut app, &mut events).await;

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        drain(&mut app, &mut events).await;
        assert!(app.tasks()[0].completed);

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('x'));
        drain(&mut app, &mut events).await;
        let names: Vec<_> = app.tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first"]);
    }

    #[tokio::test]
    async fn c_marks_the_selection_done() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.seed(USER, "first", false).await;
        let (mut app, mut events) = app_with(&api).await;
        drain(&mut app, &mut events).await;

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('c'));
        assert!(app.sync.cache().has_pending_mutations());
        drain(&mut app, &mut events).await;
        assert!(app.tasks()[0].completed);

        // marking a done task again sends nothing
        press(&mut app, KeyCode::Char('c'));
        assert!(!app.sync.cache().has_pending_mutations());
        assert!(screen(&app).contains("[x] first"));
    }

    #[tokio::test]
    async fn list_keys_are_ignored_while_typing() {
        let api = Arc::new(InMemoryTodoApi::default());
        let (mut app, mut events) = app_with(&api).await;
        drain(&mut app, &mut events).await;

        press(&mut app, KeyCode::Char('a'));
        assert!(press(&mut app, KeyCode::Char('q')));
        press(&mut app, KeyCode::Esc);
        assert!(!app.input.dialog_active);
        assert!(!press(&mut app, KeyCode::Char('q')));
    }

    #[tokio::test]
    async fn screen_shows_loading_then_error() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.fail_lists(true).await;
        let (mut app, mut events) = app_with(&api).await;

        app.sync.ensure_todos();
        assert!(screen(&app).contains("Loading..."));

        drain(&mut app, &mut events).await;
        let rendered = screen(&app);
        assert!(rendered.contains("Error:"));
        assert!(!rendered.contains("Loading..."));
    }
}
