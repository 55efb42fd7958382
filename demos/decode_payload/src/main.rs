use std::thread;

use clap::Parser;
use otpscan::{decode_payload, scheduler::unix_now, RefreshScheduler, TickOutcome};

#[derive(Parser, Debug)]
#[command(name = "decode-payload", about = "Decode a TOTP QR payload and show live codes")]
struct Cli {
    /// Text of the QR code, e.g. otpauth://totp/... or otpauth-migration://offline?data=...
    payload: String,
    /// Keep refreshing the codes for this many ticks
    #[arg(long, default_value_t = 0)]
    ticks: usize,
    /// Print the decoded result as JSON
    #[arg(long)]
    json: bool,
}

pub fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let now = unix_now();
    let result = decode_payload(&cli.payload, now)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{:?} payload, {} account(s)", result.dialect, result.accounts.len());
        for account in &result.accounts {
            println!(
                "{} / {}: {} ({}, {} digits, {}s)\n  {}",
                account.display_issuer(),
                account.label,
                account.current_code,
                account.algorithm,
                account.digits,
                account.period,
                account.provisioning_uri
            );
        }
    }

    if cli.ticks == 0 {
        return Ok(());
    }

    let mut scheduler = RefreshScheduler::new();
    let token = scheduler.arm(result, now);

    for _ in 0..cli.ticks {
        thread::sleep(scheduler.tick_interval());

        if scheduler.tick(token, unix_now()) == TickOutcome::Regenerated {
            println!("-- new window --");
        }

        let line: Vec<String> = scheduler
            .accounts()
            .iter()
            .zip(scheduler.time_left())
            .map(|(account, left)| format!("{} {:>2}s", account.current_code, left))
            .collect();
        println!("{}", line.join(" | "));
    }

    Ok(())
}
