//! Console status lines.

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

pub fn success(msg: &str) {
    if !is_quiet() {
        println!("  {} {}", "✓".green().bold(), msg.green());
    }
}

pub fn warn(msg: &str) {
    if !is_quiet() {
        println!("  {} {}", "⚠".yellow().bold(), msg.yellow());
    }
}

pub fn info(msg: &str) {
    if !is_quiet() {
        println!("  {} {}", "→".cyan(), msg);
    }
}
