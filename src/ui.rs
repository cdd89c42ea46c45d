use gemini_chat::{media, Message, Mode, Part, Role};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::App;

const USER_COLOR: Color = Color::Cyan;
const MODEL_COLOR: Color = Color::LightBlue;

/// Parse **bold**, `# headings` and `- bullets` into a styled line.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let trimmed = text.trim_start();

    if let Some(heading) = trimmed.strip_prefix('#') {
        let heading = heading.trim_start_matches('#').trim();
        return Line::from(Span::styled(
            heading.to_string(),
            Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ));
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let body = match trimmed.strip_prefix("* ").or_else(|| trimmed.strip_prefix("- ")) {
        Some(rest) => {
            let indent = text.len() - trimmed.len();
            spans.push(Span::raw(format!("{}• ", " ".repeat(indent))));
            rest
        }
        None => text,
    };

    let mut chars = body.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn image_chip(url: &str) -> Line<'static> {
    let label = match media::describe_data_uri(url) {
        Some((mime, size)) => format!("[image {}, {}]", mime, format_size(size)),
        None => format!("[image {}]", url),
    };
    Line::from(Span::styled(
        label,
        Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
    ))
}

fn loading_dots(frame: u8) -> Line<'static> {
    let spans = (0..3u8)
        .map(|i| {
            let color = if i == frame { MODEL_COLOR } else { Color::DarkGray };
            Span::styled("● ", Style::default().fg(color))
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

fn message_lines(message: &Message, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let (label, color) = match message.role {
        Role::User => ("You", USER_COLOR),
        Role::Model => ("✦ Gemini", MODEL_COLOR),
    };
    lines.push(Line::from(Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));

    if message.is_pending {
        lines.push(loading_dots(animation_frame));
    } else {
        for part in &message.parts {
            match part {
                Part::Text(text) => lines.extend(text.lines().map(parse_markdown_line)),
                Part::ImageUrl(url) => lines.push(image_chip(url)),
            }
        }
    }

    lines.push(Line::default());
    lines
}

fn text_width(text: &str) -> usize {
    Span::raw(text).width()
}

/// A run of spans that is either all whitespace or one word.
enum Piece {
    Gap(Vec<Span<'static>>),
    Word(Vec<Span<'static>>),
}

fn pieces(line: &Line<'static>) -> Vec<Piece> {
    let mut pieces: Vec<Piece> = Vec::new();
    for span in &line.spans {
        for c in span.content.chars() {
            let gap = c.is_whitespace();
            let continues = matches!(
                (pieces.last(), gap),
                (Some(Piece::Gap(_)), true) | (Some(Piece::Word(_)), false)
            );
            if !continues {
                pieces.push(if gap { Piece::Gap(Vec::new()) } else { Piece::Word(Vec::new()) });
            }
            if let Some(Piece::Gap(spans) | Piece::Word(spans)) = pieces.last_mut() {
                push_char(spans, c, span.style);
            }
        }
    }
    pieces
}

fn push_char(spans: &mut Vec<Span<'static>>, c: char, style: Style) {
    match spans.last_mut() {
        Some(last) if last.style == style => last.content.to_mut().push(c),
        _ => spans.push(Span::styled(c.to_string(), style)),
    }
}

/// Word-wrap a styled line to `width` columns, keeping span styles.
/// Words wider than a whole row are split by character.
fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    if line.width() <= width {
        return vec![line];
    }

    let line_style = line.style;
    let mut rows: Vec<Vec<Span<'static>>> = Vec::new();
    let mut row: Vec<Span<'static>> = Vec::new();
    let mut row_len = 0;
    let mut gap: Vec<Span<'static>> = Vec::new();

    for piece in pieces(&line) {
        match piece {
            Piece::Gap(spans) => {
                // Whitespace at the start of a continuation row is dropped
                if row_len == 0 && !rows.is_empty() {
                    continue;
                }
                gap = spans;
            }
            Piece::Word(spans) => {
                let gap_len: usize = gap.iter().map(Span::width).sum();
                let word_len: usize = spans.iter().map(Span::width).sum();

                if row_len > 0 && row_len + gap_len + word_len > width {
                    rows.push(std::mem::take(&mut row));
                    row_len = 0;
                    gap.clear();
                }
                let gap_len: usize = gap.iter().map(Span::width).sum();

                if row_len + gap_len + word_len <= width {
                    row.append(&mut gap);
                    row.extend(spans);
                    row_len += gap_len + word_len;
                    continue;
                }

                if gap_len < width {
                    row.append(&mut gap);
                    row_len += gap_len;
                } else {
                    gap.clear();
                }
                for span in spans {
                    for c in span.content.chars() {
                        let w = text_width(c.encode_utf8(&mut [0; 4]));
                        if row_len > 0 && row_len + w > width {
                            rows.push(std::mem::take(&mut row));
                            row_len = 0;
                        }
                        push_char(&mut row, c, span.style);
                        row_len += w;
                    }
                }
            }
        }
    }

    if !row.is_empty() || rows.is_empty() {
        rows.push(row);
    }
    rows.into_iter()
        .map(|spans| Line::from(spans).style(line_style))
        .collect()
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let staged_height = if app.staged_image.is_some() && app.mode().accepts_attachments() {
        1
    } else {
        0
    };

    let [header_area, chat_area, staged_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(staged_height),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if staged_height > 0 {
        render_staged_image(app, frame, staged_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_attach_input {
        render_attach_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let active = Style::default().bg(Color::Blue).fg(Color::White).bold();
    let inactive = Style::default().bg(Color::Black).fg(Color::Gray);

    let mut spans = vec![
        Span::styled(" ✦ Gemini ", Style::default().fg(MODEL_COLOR).bold()),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::raw("  "),
    ];
    for mode in Mode::all() {
        let style = if mode == app.mode() { active } else { inactive };
        spans.push(Span::styled(format!(" {} ", mode.display_name()), style));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);

    let messages = app.store.messages();

    // Only the greeting so far: show the welcome screen instead
    if messages.len() <= 1 {
        let top_padding = inner.height.saturating_sub(3) / 2;
        let mut lines = vec![Line::default(); top_padding as usize];
        lines.push(Line::from(Span::styled("✦", Style::default().fg(MODEL_COLOR).bold())));
        lines.push(Line::from(Span::styled(
            "How can I help you today?",
            Style::default().fg(Color::White).bold(),
        )));

        let welcome = Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(welcome, area);
        app.chat_scroll = 0;
        app.chat_max_scroll = 0;
        return;
    }

    // One Line per screen row
    let width = inner.width as usize;
    let lines: Vec<Line> = messages
        .iter()
        .flat_map(|message| message_lines(message, app.animation_frame))
        .flat_map(|line| wrap_line(line, width))
        .collect();

    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    app.chat_max_scroll = total.saturating_sub(inner.height);
    app.chat_scroll = if app.follow_bottom {
        app.chat_max_scroll
    } else {
        app.chat_scroll.min(app.chat_max_scroll)
    };

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_staged_image(app: &App, frame: &mut Frame, area: Rect) {
    let Some(staged) = &app.staged_image else {
        return;
    };

    let chip = Line::from(vec![
        Span::styled(" 📎 ", Style::default().fg(Color::Magenta)),
        Span::styled(staged.name.clone(), Style::default().fg(Color::White)),
        Span::styled(
            format!(
                " ({}, {}) ",
                staged.image.mime_type,
                format_size(staged.image.approx_bytes())
            ),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(" Ctrl+X remove ", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(chip), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let mode = app.mode();
    let locked = app.input_locked();

    let border_color = if locked { Color::DarkGray } else { Color::Yellow };
    let title = if mode.accepts_attachments() {
        format!(" {} (Enter) · attach (Ctrl+O) ", mode.action_label())
    } else {
        format!(" {} (Enter) ", mode.action_label())
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if app.input.is_empty() {
        Paragraph::new(Span::styled(
            mode.placeholder(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible_text: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();
        Paragraph::new(visible_text).style(Style::default().fg(USER_COLOR))
    };

    frame.render_widget(input.block(input_block), area);

    if !locked && !app.show_attach_input {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mode_style = match app.mode() {
        Mode::Chat => Style::default().bg(Color::Blue).fg(Color::White),
        Mode::Image => Style::default().bg(Color::Magenta).fg(Color::White),
    };
    let mut spans = vec![Span::styled(
        format!(" {} ", app.mode().as_str().to_uppercase()),
        mode_style,
    )];

    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!(" {} ", status),
            Style::default().fg(Color::Yellow),
        ));
    } else if app.show_attach_input {
        spans.extend(vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" attach ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ]);
    } else {
        spans.extend(vec![
            Span::styled(" Tab ", key_style),
            Span::styled(" mode ", label_style),
            Span::styled(" PgUp/PgDn ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" ^S ", key_style),
            Span::styled(" save image ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" quit ", label_style),
        ]);
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_attach_input(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 64.min(area.width.saturating_sub(4));
    let popup_height = 6.min(area.height);

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Attach image ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let instructions = Paragraph::new("Type or paste a file path. Enter to attach, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    // Too short for the path row
    if inner.height < 3 {
        return;
    }

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let offset = (app.attach_cursor + 1).saturating_sub(width);
    let visible: String = app.attach_input.chars().skip(offset).take(width).collect();

    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(USER_COLOR)),
        input_area,
    );

    let cursor_x = (app.attach_cursor - offset).min(width) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}
