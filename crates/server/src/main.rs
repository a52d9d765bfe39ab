// monxml-server - HTTP endpoint for NF-e zip batch processing
//
// Receives a zip of fiscal XML documents, classifies each one by its
// authorization status and emission type, and answers with a new zip
// sorted into aprovados/, contingencia/ and rejeitados/ plus per-category
// count headers.

mod http;
mod pool;
mod server;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;

use monxml_config::Settings;
use server::Server;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn request_shutdown(_signal: libc::c_int) {
    // Only atomic stores are allowed here.
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, request_shutdown as usize);
        libc::signal(libc::SIGINT, request_shutdown as usize);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

fn wait_for_shutdown() {
    while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }
}

#[derive(Parser)]
#[command(name = "monxml-server")]
#[command(about = "NF-e zip classification service")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ~/.config/monxml/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address from the settings file
    #[arg(long)]
    bind: Option<String>,
}

fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }

    let mut server = Server::new(settings);
    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {e}");
        return std::process::ExitCode::FAILURE;
    }

    // The listener runs on its own thread; block until SIGINT/SIGTERM,
    // then drain through the shutdown flag.
    install_signal_handlers();
    wait_for_shutdown();
    log::info!("Shutdown requested, stopping server");
    server.stop();
    std::process::ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test for the whole path: the flag is process-wide state, so the
    // steps have to run sequentially.
    #[test]
    fn test_shutdown_flag_unblocks_the_wait() {
        let setter = thread::spawn(|| {
            thread::sleep(Duration::from_millis(50));
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        });
        wait_for_shutdown();
        setter.join().unwrap();
        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);

        #[cfg(unix)]
        {
            install_signal_handlers();
            unsafe {
                libc::raise(libc::SIGTERM);
            }
            wait_for_shutdown();
            assert!(SHUTDOWN_REQUESTED.load(Ordering::SeqCst));
            SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
        }
    }
}
