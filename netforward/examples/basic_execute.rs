//! Basic example: log into one device and run a few show commands
//!
//! # Usage
//!
//! ```bash
//! cargo run --example basic_execute -- --host 10.0.0.1 --user admin --password secret --dialect ruijie
//! ```
//!
//! Pass `--transport telnet` or `--transport ssh-process` to use Telnet or
//! the system `ssh` client instead of the built-in SSH transport.

use std::env;
use std::time::Duration;

use netforward::{PromptMap, SessionBuilder, TransportKind};
use regex::Regex;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut session = builder_for(&args).build()?;

    println!("Connecting to {} via {}...", args.host, args.transport);
    let login = session.login().await;
    if !login.status {
        eprintln!("Login failed: {}", login.error_log);
        std::process::exit(1);
    }
    println!(
        "Logged in, prompt {:?} ({} mode)",
        session.prompt_text().unwrap_or_default(),
        session.mode()
    );

    for cmd in ["show version", "show clock"] {
        println!("\nExecuting: {}", cmd);
        println!("{}", "-".repeat(50));
        let result = session.execute(cmd).await;
        if result.status {
            println!("{}", result.content);
        } else {
            eprintln!("Command failed: {}", result.error_log);
        }
        println!("{}", "-".repeat(50));
        println!("Completed in {:?}", result.elapsed);
    }

    // Outcomes only see the last line, so a rejected command still ends on
    // the prompt; device errors are found in the content
    let prompts = PromptMap::new()
        .with("confirm", r"\[confirm\]\s*$")
        .with("success", r"(>|#|\]|\$) *$");
    let result = session
        .command("show running-config", &prompts, Duration::from_secs(60))
        .await?;
    let rejected = Regex::new(r"(?i)(unrecognized|invalid input|unknown command)")?;
    match result.outcome.as_deref() {
        Some("success") if rejected.is_match(&result.content) => {
            println!("\nrunning-config: device rejected the command")
        }
        Some("success") => println!("\nrunning-config: {} lines", result.lines().count()),
        Some(other) => println!("\nrunning-config: device answered {:?}", other),
        None => eprintln!("\nrunning-config failed: {}", result.error_log),
    }

    // scoped() is the shorthand when nothing needs the session afterwards
    session.logout().await;
    let version_lines = builder_for(&args)
        .build()?
        .scoped(async |s| s.execute("show version").await.lines().count())
        .await?;
    println!("Second session saw {} lines of version output", version_lines);

    println!("Done!");
    Ok(())
}

fn builder_for(args: &Args) -> SessionBuilder {
    let builder = SessionBuilder::new(&args.host)
        .username(&args.user)
        .password(&args.password)
        .dialect(&args.dialect)
        .transport(args.transport)
        .timeout(Duration::from_secs(args.timeout));
    match args.port {
        Some(port) => builder.port(port),
        None => builder,
    }
}

/// Simple argument parser
struct Args {
    host: String,
    port: Option<u16>,
    user: String,
    password: String,
    dialect: String,
    transport: TransportKind,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = None;
        let mut user = env::var("USER").unwrap_or_else(|_| "admin".to_string());
        let mut password = String::new();
        let mut dialect = "generic".to_string();
        let mut transport = TransportKind::Ssh;
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => host = value.unwrap_or(host),
                "--port" | "-p" => port = value.and_then(|v| v.parse().ok()),
                "--user" | "-u" => user = value.unwrap_or(user),
                "--password" | "-P" => password = value.unwrap_or_default(),
                "--dialect" | "-d" => dialect = value.unwrap_or(dialect),
                "--transport" => {
                    transport = match value.as_deref() {
                        Some("telnet") => TransportKind::Telnet,
                        Some("ssh-process") => TransportKind::SshProcess,
                        _ => TransportKind::Ssh,
                    }
                }
                "--timeout" | "-t" => timeout = value.and_then(|v| v.parse().ok()).unwrap_or(30),
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        Self {
            host,
            port,
            user,
            password,
            dialect,
            transport,
            timeout,
        }
    }

    fn print_help() {
        println!(
            r#"netforward basic_execute example

USAGE:
    cargo run --example basic_execute -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Target host [default: localhost]
    -p, --port <PORT>          Port [default: per transport]
    -u, --user <USER>          Username [default: $USER]
    -P, --password <PASS>      Password
    -d, --dialect <NAME>       generic, linux, ruijie or maipu [default: generic]
    --transport <KIND>         ssh, telnet or ssh-process [default: ssh]
    -t, --timeout <SECS>       Per-command timeout [default: 30]
    --help                     Print this help message
"#
        );
    }
}
