//! Line-by-line remote shell example
//!
//! Reads commands from stdin and runs each one on the remote host. A line
//! ending in `?` asks the remote shell for completions instead, and a bare
//! `^C` sends an interrupt.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example notebook_shell -- --host admin@router1
//! ```

use std::env;
use std::time::Duration;

use promptline::{HostKeyVerification, SessionBuilder, SshConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let ssh = SshConfig {
        host_key_verification: if args.strict {
            HostKeyVerification::Strict
        } else {
            HostKeyVerification::AcceptNew
        },
        ..SshConfig::default()
    };

    let mut builder = SessionBuilder::new()
        .ssh_config(ssh)
        .timeout(Duration::from_secs(args.timeout));
    if let Some(password) = &args.password {
        builder = builder.password(password);
    }
    let mut session = builder.build()?;

    println!("Connecting to {}...", args.host);
    session.connect(&args.host).await?;
    println!("Connected!\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line == "exit" || line == "quit" {
            break;
        }

        if line == "^C" {
            session.interrupt().await?;
            continue;
        }

        if let Some(fragment) = line.strip_suffix('?') {
            for candidate in session.completions(fragment).await {
                println!("  {}", candidate);
            }
            continue;
        }

        let mut print = |line: &str| println!("{}", line);
        let result = session.execute(line, &mut print).await?;
        if !result.is_success() {
            println!(
                "-- status {} ({})",
                result.status,
                match (&result.error_marker, result.timed_out) {
                    (Some(marker), _) => marker.as_str(),
                    (None, true) => "timed out",
                    (None, false) => "failed",
                }
            );
        }
    }

    session.close().await;
    println!("Disconnected.");

    Ok(())
}

struct Args {
    host: String,
    password: Option<String>,
    timeout: u64,
    strict: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut password = None;
        let mut timeout = 30u64;
        let mut strict = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--strict" => strict = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            host,
            password,
            timeout,
            strict,
        }
    }

    fn print_help() {
        println!(
            r#"promptline notebook_shell example

Runs stdin lines as commands on a remote interactive shell.

USAGE:
    cargo run --example notebook_shell -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Target host, optionally user@host [default: localhost]
    -P, --password <PASS>    Password for hosts without an identity file
    -t, --timeout <SECS>     Prompt timeout [default: 30]
    --strict                 Reject hosts missing from known_hosts
    --help                   Print this help message
"#
        );
    }
}
