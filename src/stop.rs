use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

/// Cooperative stop request shared between the processing loop and whatever
/// asks it to end early (Ctrl-C, the stdin watcher, the display surface).
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Install a Ctrl-C handler and, when `watch_stdin` is set, a background
    /// thread that requests a stop when a line reading `q` arrives on stdin.
    pub fn install_handlers(&self, watch_stdin: bool) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, stopping after the current frame");
            flag.request();
        })
        .context("install Ctrl-C handler")?;

        if watch_stdin {
            let flag = self.clone();
            std::thread::spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if is_quit_command(&line) {
                        log::info!("quit requested from terminal");
                        flag.request();
                        break;
                    }
                }
            });
        }
        Ok(())
    }
}

fn is_quit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!stop.is_requested());
        other.request();
        assert!(stop.is_requested());
    }

    #[test]
    fn quit_command_matching() {
        assert!(is_quit_command("q"));
        assert!(is_quit_command(" Q \n"));
        assert!(!is_quit_command("quit"));
        assert!(!is_quit_command(""));
    }
}
