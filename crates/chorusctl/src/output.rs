//! Terminal output for chorusctl

use chorus_common::{AnswerResponse, HealthResponse};
use owo_colors::OwoColorize;
use std::io::Write;

/// Progress note, dimmed on stderr so stdout stays the answer only
pub fn print_status(text: &str) {
    eprintln!("{}", format!("[{}]", text).dimmed());
}

/// Answer fragment, flushed immediately
pub fn print_fragment(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// One-line summary of how the answer was produced
pub fn print_meta(meta: &AnswerResponse) {
    let providers: Vec<String> = meta
        .candidates
        .iter()
        .map(|c| format!("{} {}ms", c.provider, c.latency_ms))
        .collect();
    let cached = if meta.cached { ", cached" } else { "" };
    eprintln!(
        "{}",
        format!("{} mode{} | {}", meta.mode, cached, providers.join(", ")).dimmed()
    );
}

pub fn print_answer(meta: &AnswerResponse) {
    println!("{}", meta.final_answer.trim_end());
    print_meta(meta);
}

pub fn print_health(health: &HealthResponse) {
    println!("{} chorusd v{}", "ok".green(), health.version);
    println!("  uptime:        {}s", health.uptime_seconds);
    println!("  cache entries: {}", health.cache_entries);
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {}", message.red());
}
