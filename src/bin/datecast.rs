//! datecast: Localize timestamp fields in JSON payloads
//!
//! Usage:
//!   # Read from file, output to stdout
//!   datecast data.json
//!
//!   # Read from stdin, convert into UTC
//!   echo '{"createdAt": "2023-07-08T12:34:56Z"}' | datecast --zone UTC
//!
//!   # Process NDJSON with custom field names
//!   datecast --ndjson events.jsonl --fields createdAt,updatedAt,deletedAt
//!
//!   # Wrap the result in a success envelope
//!   datecast --envelope --message "fetched" data.json

use anyhow::{Context, Result};
use clap::Parser;
use datecast::envelope::{ok, Reply};
use datecast::{convert_date_fields, convert_json_stream, Document, TransformOptions};
use std::fs::File;
use std::io::{stdin, stdout, BufRead, BufReader, Read, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "datecast")]
#[command(about = "Rewrite date fields in JSON into a canonical local time", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Process newline-delimited JSON (one JSON value per line)
    #[arg(long)]
    ndjson: bool,

    /// IANA timezone to express dates in (default: Asia/Shanghai)
    #[arg(long, short = 'z')]
    zone: Option<String>,

    /// Comma-separated field names to convert (default: createdAt,updatedAt)
    #[arg(long)]
    fields: Option<String>,

    /// Copy input through without converting anything
    #[arg(long)]
    no_convert: bool,

    /// Wrap the output in a {code, message, data} success envelope
    #[arg(long, conflicts_with = "ndjson")]
    envelope: bool,

    /// Envelope message (default: "success")
    #[arg(long, requires = "envelope")]
    message: Option<String>,

    /// Envelope code (default: 0)
    #[arg(long, requires = "envelope")]
    code: Option<i64>,

    /// Compact output (no pretty-printing)
    #[arg(long)]
    compact: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = build_options(&args)?;

    let reader: Box<dyn BufRead> = if let Some(file_path) = &args.input {
        let file = File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?;
        Box::new(BufReader::new(file))
    } else {
        Box::new(BufReader::new(stdin()))
    };

    let mut out = stdout().lock();

    if args.ndjson {
        let count = convert_json_stream(reader, &mut out, &options)?;
        info!(records = count, "converted NDJSON stream");
        if count == 0 {
            eprintln!("Warning: No JSON values found in input");
        }
        return Ok(());
    }

    let mut raw = String::new();
    let mut reader = reader;
    reader.read_to_string(&mut raw).context("Failed to read input")?;
    if raw.trim().is_empty() {
        eprintln!("Warning: No JSON values found in input");
        return Ok(());
    }

    let value: serde_json::Value = serde_json::from_str(&raw).context("Failed to parse JSON")?;
    let document = Document::from_json(value);

    let output = if args.envelope {
        let mut reply = Reply::new().data(document).options(options);
        if let Some(message) = args.message.clone() {
            reply = reply.message(message);
        }
        if let Some(code) = args.code {
            reply = reply.code(code);
        }
        let envelope = ok(reply);
        if args.compact {
            envelope.write_json(&mut out).context("Failed to write envelope")?;
            writeln!(out)?;
            return Ok(());
        }
        serde_json::to_value(envelope).context("Failed to serialize envelope")?
    } else {
        let converted = convert_date_fields(&document, &options);
        if args.compact {
            converted.write_json(&mut out).context("Failed to write output")?;
            writeln!(out)?;
            return Ok(());
        }
        converted.to_json().context("Failed to serialize output")?
    };

    writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;

    Ok(())
}

fn build_options(args: &Args) -> Result<TransformOptions> {
    let mut options = TransformOptions::default().with_enabled(!args.no_convert);
    if let Some(zone) = &args.zone {
        options = options.with_zone_name(zone)?;
    }
    if let Some(fields) = &args.fields {
        options = options.with_field_names(
            fields
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        );
    }
    Ok(options)
}

/// Logs go to stderr so stdout stays valid JSON
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
