use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::Command;

use log::{debug, info};
use shelfup_core::{InstallHooks, InstallProgress, NotificationSink};

/// Messages on stdout/stderr, confirmation on stdin.
pub struct ConsoleSink {
    assume_yes: bool,
}

impl ConsoleSink {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl NotificationSink for ConsoleSink {
    fn show(&self, message: &str) {
        println!("{message}");
    }

    fn show_error(&self, message: &str) {
        eprintln!("{message}");
    }

    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            println!("{question} [y/N] y");
            return true;
        }

        print!("{question} [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(error) => {
                debug!("Could not read confirmation: {error}");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prints install progress and runs the configured rebuild command.
pub struct CommandHooks {
    rebuild_command: Option<Vec<String>>,
    last_percent: Option<u64>,
}

impl CommandHooks {
    pub fn new(rebuild_command: Option<Vec<String>>) -> Self {
        Self {
            rebuild_command,
            last_percent: None,
        }
    }
}

impl InstallHooks for CommandHooks {
    fn progress(&mut self, progress: InstallProgress) {
        match progress {
            InstallProgress::Downloading {
                downloaded,
                total: Some(total),
            } if total > 0 => {
                let percent = downloaded.saturating_mul(100) / total;
                let step = percent / 10 * 10;
                if self.last_percent != Some(step) {
                    self.last_percent = Some(step);
                    println!("Downloading... {step}%");
                }
            }
            InstallProgress::Downloading { downloaded, .. } => {
                debug!("Downloaded {downloaded} bytes");
            }
            InstallProgress::Verifying => println!("Verifying checksum..."),
            InstallProgress::Extracting => println!("Extracting..."),
            InstallProgress::Applying => println!("Installing..."),
        }
    }

    fn invalidate_package(&mut self, package_name: &str, package_dir: &Path) {
        info!(
            "Package {package_name} replaced at {}; hosts should reload it",
            package_dir.display()
        );
    }

    fn rebuild(&mut self) -> Result<(), String> {
        let Some((program, args)) = self
            .rebuild_command
            .as_deref()
            .and_then(<[String]>::split_first)
        else {
            return Ok(());
        };

        info!("Running rebuild command: {program} {}", args.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|error| format!("could not run `{program}`: {error}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("`{program}` exited with {status}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers_are_case_insensitive() {
        assert!(is_yes("y\n"));
        assert!(is_yes("  YES \r\n"));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yess"));
    }

    #[test]
    fn assume_yes_confirms_without_reading_stdin() {
        assert!(ConsoleSink::new(true).confirm("Update from 2.0.1 to 2.0.6?"));
    }

    #[test]
    fn rebuild_without_command_succeeds() {
        assert_eq!(CommandHooks::new(None).rebuild(), Ok(()));
        assert_eq!(CommandHooks::new(Some(Vec::new())).rebuild(), Ok(()));
    }

    #[test]
    fn rebuild_reports_missing_program() {
        let mut hooks = CommandHooks::new(Some(vec!["shelfup-no-such-program".to_string()]));
        let error = hooks.rebuild().expect_err("missing program should fail");
        assert!(error.starts_with("could not run `shelfup-no-such-program`"));
    }

    #[cfg(unix)]
    #[test]
    fn rebuild_reports_failing_command() {
        let mut hooks = CommandHooks::new(Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            "exit 3".to_string(),
        ]));
        let error = hooks.rebuild().expect_err("non-zero exit should fail");
        assert!(error.starts_with("`sh` exited with"));

        let mut hooks = CommandHooks::new(Some(vec!["true".to_string()]));
        assert_eq!(hooks.rebuild(), Ok(()));
    }

    #[test]
    fn download_progress_is_reported_in_ten_percent_steps() {
        let mut hooks = CommandHooks::new(None);
        hooks.progress(InstallProgress::Downloading {
            downloaded: 15,
            total: Some(100),
        });
        assert_eq!(hooks.last_percent, Some(10));
        hooks.progress(InstallProgress::Downloading {
            downloaded: 100,
            total: Some(100),
        });
        assert_eq!(hooks.last_percent, Some(100));
    }
}
