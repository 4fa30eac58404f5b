use crate::core::models::{BuildConfig, BuildOutput};
use colored::*;
use std::path::Path;
use std::time::Instant;

pub struct BuildReport {
    start_time: Instant,
}

impl BuildReport {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn banner(&self, command: &str, mode: &str) {
        println!(
            "\n  {} {} {}",
            "TAILPACK".bright_cyan().bold(),
            env!("CARGO_PKG_VERSION").bright_white(),
            format!("{} ({})", command, mode).bright_black()
        );
        println!();
    }

    pub fn summary(&self, output: &BuildOutput, config: &BuildConfig) {
        let outdir = display_dir(&config.output.path, &config.root);

        for asset in &output.assets {
            println!(
                "  {}{} {}",
                outdir.bright_black(),
                asset.filename.bright_cyan(),
                format!("({})", format_size(asset.size())).bright_black()
            );
        }

        println!();
        println!(
            "  {} {} written",
            "🗺️ ".bright_green(),
            relative(&config.manifest_path, &config.root).bright_white()
        );
        println!(
            "  {} built in {}",
            "✓".bright_green(),
            format!("{:.0}ms", self.start_time.elapsed().as_secs_f64() * 1000.0)
                .bright_white()
                .bold()
        );
    }

    pub fn failure(&self, message: &str) {
        println!();
        println!("  {} {}", "✗".bright_red(), "build failed".bright_red().bold());
        println!("{}", message);
    }
}

impl Default for BuildReport {
    fn default() -> Self {
        Self::new()
    }
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn display_dir(path: &Path, root: &Path) -> String {
    format!("{}/", relative(path, root))
}

pub fn format_size(bytes: usize) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb < 1.0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} kB", kb)
    }
}
