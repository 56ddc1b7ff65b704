//! CLI front-end: parses flags, builds a [`hpn_scp::SessionConfig`], and
//! drives one end of the wire protocol over this process's stdin/stdout.

mod cli;
mod stdio;
mod walk;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use hpn_scp::{Session, SessionConfig};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Mode};
use stdio::StdioLink;

// The fatal-error path below is this binary's one legitimate use of
// stderr for a user-facing message, outside of the installed tracing
// subscriber.
#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    install_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(error_count) => {
            if error_count == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("hpnscp: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: &Cli) -> Result<u32> {
    let config = build_config(cli)?;
    let mut link = StdioLink::new();

    match &cli.mode {
        Mode::From { paths } => {
            if paths.is_empty() {
                anyhow::bail!("no source paths given");
            }
            let items = walk::collect(paths, config.recursive, config.preserve)?;
            let mut session = Session::new(&mut link, config);
            session.send_all(&items).context("send failed")?;
            Ok(session.error_count())
        }
        Mode::To { destination } => {
            prepare_destination(destination, config.target_is_directory)?;
            let patterns = (!cli.pattern.is_empty()).then_some(cli.pattern.as_slice());
            let mut session = Session::new(&mut link, config);
            session.receive_all(destination, patterns).context("receive failed")?;
            Ok(session.error_count())
        }
    }
}

fn prepare_destination(path: &Path, force_directory: bool) -> Result<()> {
    if force_directory || path.to_string_lossy().ends_with('/') {
        std::fs::create_dir_all(path).with_context(|| format!("{}: create_dir_all failed", path.display()))?;
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<SessionConfig> {
    let base = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("{}: read failed", path.display()))?;
            toml::from_str(&text).with_context(|| format!("{}: invalid config", path.display()))?
        }
        None => SessionConfig::default(),
    };

    Ok(base
        .as_builder()
        .recursive(base.recursive || cli.recursive)
        .preserve(base.preserve || cli.preserve)
        .target_is_directory(base.target_is_directory || cli.target_is_directory)
        .resume(base.resume || cli.resume)
        .bandwidth_limit_kbps(cli.bandwidth_limit_kbps.or(base.bandwidth_limit_kbps))
        .verbose(base.verbose || cli.verbose)
        .quiet(base.quiet || cli.quiet)
        .build())
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_merges_cli_flags_over_defaults() {
        let cli = Cli::parse_from(["hpnscp", "-r", "-Z", "to", "/tmp/dest"]);
        let config = build_config(&cli).unwrap();
        assert!(config.recursive);
        assert!(config.resume);
        assert!(!config.preserve);
    }
}
