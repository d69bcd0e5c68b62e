//! Turns a message into the plain-text letter that goes to the printer.

use crate::device::RenderedDocument;
use crate::message::Message;
use chrono::Weekday;

pub const LINE_WIDTH: usize = 72;

pub fn render_letter(message: &Message) -> RenderedDocument {
    let mut text = String::new();
    text.push_str(message.subject());
    text.push('\n');
    text.push_str(weekday_name(message.weekday()));
    text.push_str("\n\n");
    text.push_str(message.recipient());
    text.push_str("\n\n");
    for line in wrap(message.body(), LINE_WIDTH) {
        text.push_str(&line);
        text.push('\n');
    }
    text.push_str("\nTerveisin,\n");
    text.push_str(message.author());
    text.push('\n');

    RenderedDocument {
        title: message.subject().to_string(),
        body: text.into_bytes(),
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Maanantai",
        Weekday::Tue => "Tiistai",
        Weekday::Wed => "Keskiviikko",
        Weekday::Thu => "Torstai",
        Weekday::Fri => "Perjantai",
        Weekday::Sat => "Lauantai",
        Weekday::Sun => "Sunnuntai",
    }
}

/// Greedy word wrap. Line breaks in the input are kept; words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                lines.push(word.drain(..width).collect());
            }
            if word.is_empty() {
                continue;
            }
            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > width {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }
        lines.push(line);
    }
    lines
}
