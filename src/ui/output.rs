use crate::output::is_quiet;
use crate::ui::theme::{theme, Role};
use crate::ui::Icons;

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::CHART, theme().paint(Role::Title, text));
}

pub fn status(icon: &str, label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}: {}", icon, theme().paint(Role::Label, label), value);
}

pub fn success(label: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::CHECK, theme().paint(Role::Ok, label));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, theme().paint(Role::Failure, label));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, theme().paint(Role::Caution, label));
}

pub fn info(label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!(
        "{} {}: {}",
        theme().paint(Role::Note, Icons::INFO),
        theme().paint(Role::Label, label),
        value
    );
}

pub fn section(title: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("━{}━", theme().paint(Role::Title, title));
}

pub fn dim(text: &str) -> String {
    theme().paint(Role::Label, text)
}

pub fn muted(text: &str) -> String {
    theme().paint(Role::Aside, text)
}

pub fn summary_row(label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!("  {} {}", theme().paint(Role::Label, label), value);
}

/// Amount with thousands separators and two decimals, e.g. `1,234,567.50`
pub fn money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let negative = value < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0');
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac)
}

/// Signed percentage, already scaled to 100, colored by direction
pub fn percent(rate: f64) -> String {
    let text = format!("{:+.2}%", rate);
    match Role::for_change(rate) {
        Some(role @ Role::Rise) => format!("{} {}", Icons::UP, theme().paint(role, &text)),
        Some(role) => format!("{} {}", Icons::DOWN, theme().paint(role, &text)),
        None => text,
    }
}
