mod client;
mod subscriber;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use chrono::{NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use tracing::error;

use crate::client::{ClientError, MonitorClient};
use crate::subscriber::Subscriber;

/// Interactive client for the vigil monitoring server.
#[derive(Debug, Parser)]
#[command(name = "vigil-client", version, about)]
struct Args {
    /// Monitoring server host
    #[arg(long)]
    server_host: String,

    /// Control channel port
    #[arg(long, default_value_t = 5000)]
    server_port: u16,

    /// Relay backend port pushed status records arrive on
    #[arg(long, default_value_t = 4999)]
    sub_port: u16,
}

const HELP: &str = "commands: register-service | set-outage-time | set-grace-time | exit";

fn main() -> ExitCode {
    vigil_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "session ended");
            eprintln!("session ended: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), ClientError> {
    let ctx = zmq::Context::new();

    println!("Connecting to server...");
    let client = MonitorClient::connect(&ctx, &args.server_host, args.server_port)?;
    println!("Connected. Client id: {}", client.id());

    let subscriber = Subscriber::connect(&ctx, &args.server_host, args.sub_port, client.id())?;
    let terminate = subscriber.terminate_handle();
    let subscriber_thread = std::thread::spawn(move || subscriber.run());

    let result = prompt_loop(&client);

    terminate.store(true, Ordering::Relaxed);
    if subscriber_thread.join().is_err() {
        error!("subscriber thread panicked");
    }
    result
}

/// Read commands until `exit`, EOF or an unrecoverable error.
fn prompt_loop(client: &MonitorClient) -> Result<(), ClientError> {
    println!("{HELP}");
    loop {
        let Some(command) = prompt("command")? else { return Ok(()) };

        let outcome = match command.as_str() {
            "register-service" => register_service(client),
            "set-outage-time" => set_outage_time(client),
            "set-grace-time" => set_grace_time(client),
            "exit" => return Ok(()),
            "" => continue,
            _ => {
                println!("unknown command. {HELP}");
                continue;
            }
        };

        match outcome {
            Ok(()) => println!("ok"),
            Err(err) if err.is_recoverable() => println!("error: {err}"),
            Err(err) => return Err(err),
        }
    }
}

fn register_service(client: &MonitorClient) -> Result<(), ClientError> {
    let Some(line) = prompt("service host, port and poll frequency in seconds (e.g. 127.0.0.1 5000 3)")?
    else {
        return Ok(());
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [host, port, poll_freq] = fields.as_slice() else {
        println!("expected: <host> <port> <poll_freq>");
        return Ok(());
    };
    let (Ok(port), Ok(poll_freq)) = (port.parse::<u16>(), poll_freq.parse::<u64>()) else {
        println!("port and poll frequency must be numbers");
        return Ok(());
    };

    client.register_service(host, port, poll_freq)
}

fn set_outage_time(client: &MonitorClient) -> Result<(), ClientError> {
    let Some(line) = prompt(
        "service and outage window, format: <host> <port> YYYY-MM-DD HH:MM:SS YYYY-MM-DD HH:MM:SS",
    )?
    else {
        return Ok(());
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [host, port, start_date, start_time, end_date, end_time] = fields.as_slice() else {
        println!("expected: <host> <port> <start date> <start time> <end date> <end time>");
        return Ok(());
    };
    let Ok(port) = port.parse::<u16>() else {
        println!("port must be a number");
        return Ok(());
    };
    let (Some(start), Some(end)) =
        (parse_datetime(start_date, start_time), parse_datetime(end_date, end_time))
    else {
        println!("times must be formatted as YYYY-MM-DD HH:MM:SS");
        return Ok(());
    };

    client.set_outage_time(host, port, start, end)
}

fn set_grace_time(client: &MonitorClient) -> Result<(), ClientError> {
    let Some(line) = prompt("grace time in seconds (-1 to cancel)")? else { return Ok(()) };

    let Ok(grace_time) = line.trim().parse::<i64>() else {
        println!("grace time must be an integer");
        return Ok(());
    };

    client.set_grace_time(grace_time)
}

/// Local wall-clock input, converted to UTC for the wire.
fn parse_datetime(date: &str, time: &str) -> Option<chrono::DateTime<Utc>> {
    let naive =
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").ok()?;
    chrono::Local.from_local_datetime(&naive).single().map(|local| local.with_timezone(&Utc))
}

/// One line of input; `None` on EOF.
fn prompt(label: &str) -> Result<Option<String>, ClientError> {
    print!("{label}> ");
    io::stdout().flush()?;

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line)? {
        0 => Ok(None),
        _ => Ok(Some(line.trim().to_owned())),
    }
}
