//! Multi-device example: run the same commands on every device in an inventory
//!
//! Each device gets its own task and session. A failure on one device is
//! reported and does not stop the others.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example multi_device -- inventory.json "show version" "show clock"
//! ```
//!
//! `inventory.json` is a list of device profiles:
//!
//! ```json
//! [
//!   {"address": "10.0.0.1", "username": "admin", "password": "secret", "dialect": "ruijie"},
//!   {"address": "10.0.0.2", "username": "admin", "password": "secret", "transport": "telnet"}
//! ]
//! ```

use std::env;
use std::fs;

use log::{error, info};
use netforward::DeviceProfile;
use tokio::task::JoinSet;

#[derive(Debug)]
struct DeviceReport {
    address: String,
    outputs: Vec<(String, Result<String, String>)>,
}

async fn run_device(profile: DeviceProfile, commands: Vec<String>) -> Result<DeviceReport, String> {
    let address = profile.address.clone();
    let mut session = profile.builder().build().map_err(|e| e.to_string())?;

    let login = session.login().await;
    if !login.status {
        return Err(login.error_log);
    }
    info!("{}: ready in {} mode", address, session.mode());

    let mut outputs = Vec::with_capacity(commands.len());
    for cmd in commands {
        let result = session.execute(&cmd).await;
        let output = if result.status {
            Ok(result.content)
        } else {
            Err(result.error_log)
        };
        outputs.push((cmd, output));
    }

    let logout = session.logout().await;
    if !logout.status {
        error!("{}: {}", address, logout.error_log);
    }
    Ok(DeviceReport { address, outputs })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let Some(inventory) = args.next() else {
        eprintln!("usage: multi_device <inventory.json> [command...]");
        std::process::exit(2);
    };
    let mut commands: Vec<String> = args.collect();
    if commands.is_empty() {
        commands.push("show version".to_string());
    }

    let profiles: Vec<DeviceProfile> = serde_json::from_str(&fs::read_to_string(&inventory)?)?;
    println!("Running {} command(s) on {} device(s)", commands.len(), profiles.len());

    let mut tasks = JoinSet::new();
    for profile in profiles {
        let address = profile.address.clone();
        let commands = commands.clone();
        tasks.spawn(async move { (address, run_device(profile, commands).await) });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            (_, Ok(report)) => {
                println!("\n=== {} ===", report.address);
                for (cmd, output) in report.outputs {
                    match output {
                        Ok(content) => println!("# {}\n{}", cmd, content),
                        Err(log) => println!("# {} FAILED: {}", cmd, log),
                    }
                }
            }
            (address, Err(reason)) => {
                failed += 1;
                println!("\n=== {} === login failed: {}", address, reason);
            }
        }
    }

    println!("\n{} device(s) failed", failed);
    Ok(())
}
