// deskboot-core/src/ui.rs
//! Progress lines on stdout. Diagnostics go through `tracing` on stderr.
use colored::Colorize;

pub fn stage(number: u8, title: &str) {
    println!(
        "{}{}",
        "==> ".bold().blue(),
        format!("[{number}/7] {title}").bold()
    );
}

pub fn step(message: &str) {
    println!("    {message}");
}

pub fn notice(message: &str) {
    println!("    {}", message.yellow());
}
