use crate::resolve::Location;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

/// One resolved location: `path row column length`
pub fn location(loc: &Location) {
    println!(
        "{} {} {} {}",
        loc.path.style(theme().path.clone()),
        loc.position.row.style(theme().position.clone()),
        loc.position.column.style(theme().position.clone()),
        muted(&loc.length.to_string())
    );
}

pub fn document_failed(document: &str, reason: &str) {
    eprintln!(
        "{} {}: {}",
        Icons::DEL.style(theme().error.clone()),
        document,
        reason.style(theme().error.clone())
    );
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}
