use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use vibe_sitegen::orchestrator::{CategorizationReply, ChatReply};
use vibe_sitegen::wire::{Category, SourceFile};

/// Spinner on stderr while waiting for the backend.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn show_categorization(reply: &CategorizationReply) {
    let label = match reply.category {
        Category::CodeRequest => "[BUILD]".green().bold(),
        Category::GeneralInquiry => "[ANSWER]".cyan().bold(),
    };
    println!("{} {}", label, reply.category.to_string().dimmed());
    if !reply.prompt.is_empty() {
        println!("{} {}", "prompt:".bold(), reply.prompt);
    }
    if !reply.response.is_empty() {
        println!("{}", reply.response);
    }
}

pub fn show_chat(reply: &ChatReply) {
    println!("{}", "[ANSWER]".cyan().bold());
    println!("{}", reply.response);
}

pub fn show_files(files: &[SourceFile]) {
    println!("\n{}", "Generated files:".bold());
    for f in files {
        println!(
            "  {}  {} ({})",
            "[FILE]".green().bold(),
            f.name,
            humansize::format_size(f.content.len(), humansize::DECIMAL)
        );
    }
}

pub fn show_written(what: &str, path: &str, bytes: usize) {
    println!(
        "{} {} -> {} ({})",
        "[WROTE]".green().bold(),
        what,
        path.bold(),
        humansize::format_size(bytes, humansize::DECIMAL)
    );
}
