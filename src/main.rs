use std::os::fd::AsFd;
use std::process::ExitCode;

use tokio::net::unix::pipe;
use tracing_subscriber::EnvFilter;

use tsswitch::config::{self, MuxConfig};
use tsswitch::Mux;

fn usage(program: &str) {
    eprintln!("usage: {} cmd1 [args..] [-- cmd2 [args..]]...", program);
}

/// The combined TS stream goes to our own stdout, driven non-blocking; it has
/// to be a pipe (the normal deployment pipes it into the next tool).
fn stdout_sink() -> std::io::Result<pipe::Sender> {
    let fd = std::io::stdout().as_fd().try_clone_to_owned()?;
    pipe::Sender::from_owned_fd(fd)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the transport stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "tsswitch".into());

    let groups = match config::parse_groups(args) {
        Ok(groups) => groups,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            usage(&program);
            return ExitCode::FAILURE;
        }
    };

    let sink = match stdout_sink() {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("{}: stdout must be a pipe: {}", program, e);
            return ExitCode::FAILURE;
        }
    };

    let mut mux = match Mux::new(groups, MuxConfig::default(), sink) {
        Ok(mux) => mux,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            usage(&program);
            return ExitCode::FAILURE;
        }
    };

    match mux.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            ExitCode::FAILURE
        }
    }
}
