use derivative::Derivative;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::app::models::NewTask;

// Field of the input form the cursor is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Derivative)]
#[derivative(Default)]
enum Field {
    #[derivative(Default)]
    Name,
    Description,
}

// State object for the task input form
// Keeps track of whether the form is open, what was typed and where the cursor is
#[derive(Debug, Derivative)]
#[derivative(Default)]
pub struct TaskInputState {
    pub dialog_active: bool,
    name: String,
    description: String,
    field: Field,
    // Cursor column, counted in chars
    column: usize,
    error_message: Option<String>,
}

// Byte offset of the char at `column`, or the end of the string
fn byte_index(value: &str, column: usize) -> usize {
    value
        .char_indices()
        .nth(column)
        .map_or(value.len(), |(index, _)| index)
}

impl TaskInputState {
    // Opens an empty form with the cursor on the name
    pub fn open(&mut self) {
        *self = TaskInputState {
            dialog_active: true,
            ..TaskInputState::default()
        };
    }

    pub fn cancel(&mut self) {
        self.dialog_active = false;
        self.error_message = None;
    }

    fn current(&self) -> &str {
        match self.field {
            Field::Name => &self.name,
            Field::Description => &self.description,
        }
    }

    fn current_mut(&mut self) -> &mut String {
        match self.field {
            Field::Name => &mut self.name,
            Field::Description => &mut self.description,
        }
    }

    // Move the cursor to the description; the column is kept if the line is long enough
    pub fn move_cursor_down(&mut self) {
        self.field = Field::Description;
        self.column = self.column.min(self.current().chars().count());
    }

    pub fn move_cursor_up(&mut self) {
        self.field = Field::Name;
        self.column = self.column.min(self.current().chars().count());
    }

    pub fn move_cursor_left(&mut self) {
        self.column = self.column.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        self.column = (self.column + 1).min(self.current().chars().count());
    }

    // Delete the char before the cursor
    pub fn delete_char(&mut self) {
        if self.column == 0 {
            return;
        }
        let at = byte_index(self.current(), self.column - 1);
        self.current_mut().remove(at);
        self.column -= 1;
    }

    // Insert a char at the cursor of the active field
    pub fn input(&mut self, to_insert: char) {
        let at = byte_index(self.current(), self.column);
        self.current_mut().insert(at, to_insert);
        self.column += 1;
        self.error_message = None;
    }

    /// Validates the form and turns it into a creation request.
    ///
    /// On success the form is cleared and closed. An empty name keeps the
    /// form open with an error message.
    pub fn submit(&mut self) -> Option<NewTask> {
        let name = self.name.trim();
        if name.is_empty() {
            self.error_message = Some("Name cannot be empty".to_string());
            return None;
        }

        let todo = NewTask::named(name).with_description(self.description.trim());
        *self = TaskInputState::default();
        Some(todo)
    }
}

// Returns the UI content for the task input form
pub fn get_task_input_ui<'a>(state: &'a TaskInputState, adding: bool) -> Vec<Line<'a>> {
    const GRAY_TEXT: Style = Style::new().fg(Color::Rgb(62, 62, 62));
    const WHITE_TEXT: Style = Style::new().fg(Color::White);
    const BLACK_ON_WHITE: Style = Style::new().fg(Color::Black).bg(Color::White);

    struct InputLine<'a> {
        field: Field,
        prefix: &'static str,
        placeholder: &'static str,
        value: &'a str,
    }

    let lines = [
        InputLine {
            field: Field::Name,
            prefix: "Name:        ",
            placeholder: "Todo name",
            value: &state.name,
        },
        InputLine {
            field: Field::Description,
            prefix: "Description: ",
            placeholder: "Optional details",
            value: &state.description,
        },
    ];

    let mut text = Vec::new();
    for line in lines {
        let value: &'a str = line.value;
        let mut spans = vec![Span::styled(line.prefix, WHITE_TEXT)];
        let selected = state.field == line.field;

        if value.is_empty() {
            // Empty line: placeholder in gray, first char highlighted when selected
            if selected {
                let (first, rest) = line.placeholder.split_at(1);
                spans.push(Span::styled(first, BLACK_ON_WHITE));
                spans.push(Span::styled(rest, GRAY_TEXT));
            } else {
                spans.push(Span::styled(line.placeholder, GRAY_TEXT));
            }
        } else if selected {
            // The char under the cursor is highlighted
            let before = byte_index(value, state.column);
            let after = byte_index(value, state.column + 1);
            spans.push(Span::styled(&value[..before], WHITE_TEXT));
            if before == value.len() {
                spans.push(Span::styled(" ", BLACK_ON_WHITE));
            } else {
                spans.push(Span::styled(&value[before..after], BLACK_ON_WHITE));
                spans.push(Span::styled(&value[after..], WHITE_TEXT));
            }
        } else {
            spans.push(Span::styled(value, WHITE_TEXT));
        }

        text.push(Line::from(spans));
    }

    text.push(Line::raw(""));

    if let Some(error_message) = &state.error_message {
        text.push(Line::from(Span::styled(error_message.as_str(), Style::new().fg(Color::Red))));
        text.push(Line::raw(""));
    }

    let hint = if adding {
        "Adding... Enter - add another, Esc - close"
    } else {
        "Enter - add todo, Esc - cancel"
    };
    text.push(Line::from(Span::styled(hint, WHITE_TEXT)));

    text
}
