use chrono::{DateTime, Utc};
use now::DateTimeNow;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::app::cache::{QueryCache, QueryKey};
use crate::app::models::Task;

// The server purges every task this long after creation
const RETENTION_HOURS: i64 = 24;
// Tasks closer than this to their purge are counted as expiring
const EXPIRY_WARNING_HOURS: i64 = 1;

const DIMMED: Style = Style::new().fg(Color::DarkGray);

// One confirmed task row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TodoEntry<'a> {
    pub task: &'a Task,
    pub pending: bool,
}

// What the list pane shows, derived from the cache on every frame
#[derive(Debug, Clone, PartialEq)]
pub enum TodoListView<'a> {
    Loading,
    Failed(&'a str),
    Ready {
        provisional: Vec<&'a str>,
        entries: Vec<TodoEntry<'a>>,
    },
}

impl<'a> TodoListView<'a> {
    pub fn from_cache(cache: &'a QueryCache, key: &QueryKey) -> TodoListView<'a> {
        let snapshot = cache.read(key);
        match (snapshot.data, snapshot.error) {
            (Some(tasks), _) => TodoListView::Ready {
                provisional: cache.pending_creations(),
                entries: tasks
                    .iter()
                    .map(|task| TodoEntry {
                        task,
                        pending: cache.is_task_pending(task.id),
                    })
                    .collect(),
            },
            (None, Some(error)) if !snapshot.is_fetching => TodoListView::Failed(error),
            (None, _) => TodoListView::Loading,
        }
    }

    pub fn entries(&self) -> &[TodoEntry<'a>] {
        match self {
            TodoListView::Ready { entries, .. } => entries,
            _ => &[],
        }
    }

    // Rows rendered above the first confirmed task
    pub fn provisional_count(&self) -> usize {
        match self {
            TodoListView::Ready { provisional, .. } => provisional.len(),
            TodoListView::Loading => 1,
            TodoListView::Failed(_) => 0,
        }
    }
}

// Selection over the confirmed tasks. Provisional rows are never selectable.
#[derive(Default)]
pub struct TaskList {
    pub state: ListState,
}

impl TaskList {
    // Move the selection to the next item, wrapping at the end
    pub fn next(&mut self, len: usize) {
        let i = match self.state.selected() {
            Some(i) => {
                if len == 0 || i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    // Move the selection to the previous item, wrapping at the start
    pub fn previous(&mut self, len: usize) {
        let i = match self.state.selected() {
            Some(i) => {
                if len == 0 {
                    0
                } else if i == 0 || i > len - 1 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn unselect(&mut self) {
        self.state.select(None);
    }

    // Selected index, clamped to the current number of tasks
    pub fn selected(&self, len: usize) -> Option<usize> {
        match self.state.selected() {
            Some(_) if len == 0 => None,
            Some(i) => Some(i.min(len - 1)),
            None => None,
        }
    }

    // List state for rendering, shifted past the provisional rows
    pub fn render_state(&self, offset: usize, len: usize) -> ListState {
        let mut state = ListState::default();
        state.select(self.selected(len).map(|i| i + offset));
        state
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatistics {
    pub total: usize,
    pub completed: usize,
    pub open: usize,
    pub created_today: usize,
    pub expiring_soon: usize,
}

impl TaskStatistics {
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let purge_horizon = now + chrono::Duration::hours(EXPIRY_WARNING_HOURS);
        let retention = chrono::Duration::hours(RETENTION_HOURS);
        let start_of_day = now.beginning_of_day();

        tasks.iter().fold(TaskStatistics::default(), |mut stats, task| {
            stats.total += 1;
            if task.completed {
                stats.completed += 1;
            } else {
                stats.open += 1;
            }
            if task.created_at >= start_of_day {
                stats.created_today += 1;
            }
            if task.created_at + retention <= purge_horizon {
                stats.expiring_soon += 1;
            }
            stats
        })
    }
}

// Build the UI (list) for the task list pane
pub fn get_list_items_ui<'a>(view: &TodoListView<'a>) -> Vec<ListItem<'a>> {
    match view {
        TodoListView::Loading => vec![ListItem::new("Loading...").style(DIMMED)],
        TodoListView::Failed(_) => Vec::new(),
        TodoListView::Ready { provisional, entries } => {
            let placeholders = provisional.iter().map(|name| {
                ListItem::new(Line::from(vec![Span::from("[ ] "), Span::from(*name)]))
                    .style(DIMMED)
            });

            let tasks = entries.iter().map(|entry| {
                let mut lines = Vec::new();
                let mut first = vec![
                    Span::from(if entry.task.completed { "[x] " } else { "[ ] " }),
                    Span::from(entry.task.name.as_str()),
                ];
                if entry.pending {
                    first.push(Span::from(" …"));
                }
                lines.push(Line::from(first));

                if let Some(description) = &entry.task.description {
                    lines.push(Line::from(Span::styled(
                        format!("    {description}"),
                        Style::new().add_modifier(Modifier::ITALIC),
                    )));
                }

                let style = if entry.pending {
                    DIMMED
                } else if entry.task.completed {
                    Style::default().fg(Color::Green).add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default().fg(Color::White)
                };
                ListItem::new(lines).style(style)
            });

            placeholders.chain(tasks).collect()
        }
    }
}

// Build the UI (lines) for statistics infobox
pub fn get_statistics_ui<'a>(stats: &TaskStatistics) -> Vec<Line<'a>> {
    vec![
        Line::from(format!("Total tasks: {}", stats.total)),
        Line::from(format!("Open tasks: {}", stats.open)),
        Line::from(format!("Completed: {}", stats.completed)),
        Line::from(format!("Created today: {}", stats.created_today)),
        Line::from(format!("Expiring within the hour: {}", stats.expiring_soon)),
    ]
}

// Build the UI (lines) for instructions infobox
pub fn get_instructions_ui<'a>() -> Vec<Line<'a>> {
    vec![
        "Enter - toggle do/done".into(),
        "c - mark done".into(),
        "a - add a task".into(),
        "x - delete a task".into(),
        "r - refresh".into(),
        "Up/Down - move, Left - unselect".into(),
        "q - quit".into(),
    ]
}
