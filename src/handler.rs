use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::app::App;
use crate::tui::AppEvent;

const PAGE: u16 = 10;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any state
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_attach_input {
        handle_attach_key(app, key).await;
    } else {
        handle_chat_key(app, key).await;
    }
}

async fn handle_attach_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_attach_input(),
        KeyCode::Enter => app.attach_from_input().await,
        _ => {
            edit_line(&mut app.attach_input, &mut app.attach_cursor, key);
        }
    }
}

async fn handle_chat_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Tab | KeyCode::BackTab => app.toggle_mode(),
        KeyCode::Char('o') if ctrl => app.open_attach_input(),
        KeyCode::Char('x') if ctrl => app.remove_staged_image(),
        KeyCode::Char('s') if ctrl => app.save_last_image().await,

        KeyCode::PageUp => app.scroll_up(PAGE),
        KeyCode::PageDown => app.scroll_down(PAGE),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),

        // Everything below edits or sends the prompt, which is locked mid-request
        _ if app.input_locked() => {}
        KeyCode::Enter => app.submit(),
        _ => {
            edit_line(&mut app.input, &mut app.input_cursor, key);
        }
    }
}

/// Apply a line-editing key to `text`. Returns whether the key was consumed.
fn edit_line(text: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    let char_count = text.chars().count();
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(char_count),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = char_count,
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

fn handle_paste(app: &mut App, pasted: &str) {
    // Prompts are single-line; newlines in pasted text become spaces
    let pasted = pasted.replace(['\r', '\n'], " ");

    let (text, cursor) = if app.show_attach_input {
        (&mut app.attach_input, &mut app.attach_cursor)
    } else if !app.input_locked() {
        (&mut app.input, &mut app.input_cursor)
    } else {
        return;
    };

    let byte_pos = char_to_byte_index(text, *cursor);
    text.insert_str(byte_pos, &pasted);
    *cursor += pasted.chars().count();
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }

    #[test]
    fn test_edit_line_insert_and_delete() {
        let mut text = String::new();
        let mut cursor = 0;

        for c in "héllo".chars() {
            assert!(edit_line(&mut text, &mut cursor, key(KeyCode::Char(c))));
        }
        assert_eq!(text, "héllo");
        assert_eq!(cursor, 5);

        edit_line(&mut text, &mut cursor, key(KeyCode::Home));
        edit_line(&mut text, &mut cursor, key(KeyCode::Right));
        edit_line(&mut text, &mut cursor, key(KeyCode::Delete));
        assert_eq!(text, "hllo");

        edit_line(&mut text, &mut cursor, key(KeyCode::End));
        edit_line(&mut text, &mut cursor, key(KeyCode::Backspace));
        assert_eq!(text, "hll");
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_edit_line_ignores_control_chords() {
        let mut text = String::new();
        let mut cursor = 0;
        let chord = KeyEvent::new(KeyCode::Char('o'), KeyModifiers::CONTROL);

        assert!(!edit_line(&mut text, &mut cursor, chord));
        assert!(text.is_empty());
    }
}
