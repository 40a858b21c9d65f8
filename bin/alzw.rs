#![forbid(unsafe_code)]
use std::io::Write;
use std::path::PathBuf;
use std::{env, ffi, fs, io};

use adaptive_lzw::{decode::Decoder, encode::Encoder, AllResult, BitOrder, CodebookState, Mode};

fn main() -> CodingResult {
    init_logging();
    CodingResult::catch_panic(|| {
        let flags = Flags::from_args(env::args_os());
        run_coding(flags)
    })
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // Standard output carries the coded data.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_lzw=warn,alzw=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn run_coding(flags: Flags) -> Result<(), io::Error> {
    let input: Box<dyn io::BufRead> = match flags.input {
        Input::File(file) => {
            let data = fs::File::open(file)?;
            Box::new(io::BufReader::with_capacity(1 << 20, data))
        }
        Input::Stdin => Box::new(io::BufReader::with_capacity(1 << 20, io::stdin().lock())),
    };

    let mut out = io::BufWriter::new(io::stdout().lock());

    let (result, state) = match flags.operation {
        Operation::Compress(mode) => {
            let mut encoder = Encoder::new(flags.bit_order, mode);
            let result = encoder.into_stream(&mut out).encode_all(input);
            (result, encoder.codebook_state())
        }
        Operation::Expand => {
            let mut decoder = Decoder::new(flags.bit_order);
            let result = decoder.into_stream(&mut out).decode_all(input);
            if let Some(mode) = decoder.mode() {
                tracing::info!(%mode, "stream header read");
            }
            (result, decoder.codebook_state())
        }
    };

    report(&result, state);
    result.status?;
    out.flush()
}

fn report(result: &AllResult, state: CodebookState) {
    tracing::info!(
        bytes_read = result.bytes_read,
        bytes_written = result.bytes_written,
        "coding finished"
    );
    tracing::debug!(
        code_width = state.code_width,
        next_code = state.next_code,
        resets = state.resets,
        "final dictionary"
    );
}

struct Flags {
    input: Input,
    operation: Operation,
    bit_order: BitOrder,
}

#[derive(Debug)]
enum Input {
    File(PathBuf),
    Stdin,
}

#[derive(Debug)]
enum Operation {
    Compress(Mode),
    Expand,
}

fn command() -> clap::Command {
    let bit_order = clap::Arg::new("bit_order")
        .short('b')
        .long("bit-order")
        .default_value("most")
        .value_parser(["l", "m", "least", "most"]);
    let file = clap::Arg::new("file")
        .default_value("-")
        .value_parser(clap::builder::ValueParser::path_buf());

    clap::Command::new("alzw")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compress and expand data with adaptive LZW")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            clap::Command::new("compress")
                .about("Compress the file, or stdin, to stdout")
                .arg(
                    clap::Arg::new("mode")
                        .short('m')
                        .long("mode")
                        .default_value("n")
                        .help("What to do with a full dictionary: (n)o reset, (r)eset or (m)onitor")
                        .value_parser(["n", "r", "m", "none", "reset", "monitor"]),
                )
                .arg(bit_order.clone())
                .arg(file.clone()),
        )
        .subcommand(
            clap::Command::new("expand")
                .about("Expand the file, or stdin, to stdout")
                .arg(bit_order)
                .arg(file),
        )
}

impl Flags {
    fn from_args(args: impl Iterator<Item = ffi::OsString>) -> Self {
        let matches = command().get_matches_from(args);

        let (operation, sub) = match matches.subcommand() {
            Some(("compress", sub)) => {
                let mode = match sub.get_one::<String>("mode").map(String::as_str) {
                    Some("n") | Some("none") => Mode::NoReset,
                    Some("r") | Some("reset") => Mode::Reset,
                    Some("m") | Some("monitor") => Mode::Monitor,
                    _ => unreachable!("unparsed mode"),
                };
                (Operation::Compress(mode), sub)
            }
            Some(("expand", sub)) => (Operation::Expand, sub),
            _ => unreachable!("subcommand is required"),
        };

        let bit_order = match sub.get_one::<String>("bit_order").map(String::as_str) {
            Some("m") | Some("most") => BitOrder::Msb,
            Some("l") | Some("least") => BitOrder::Lsb,
            _ => unreachable!("unparsed bit order"),
        };

        let input = match sub.get_one::<PathBuf>("file") {
            Some(p) if *p != PathBuf::from("-") => Input::File(p.clone()),
            _ => Input::Stdin,
        };

        Flags {
            input,
            operation,
            bit_order,
        }
    }
}

enum CodingResult {
    Ok,
    Err(io::Error),
    Panic,
}

impl CodingResult {
    fn catch_panic(op: fn() -> Result<(), io::Error>) -> Self {
        std::panic::catch_unwind(|| match op() {
            Ok(()) => CodingResult::Ok,
            Err(err) => CodingResult::Err(err),
        })
        .unwrap_or(CodingResult::Panic)
    }
}

impl std::process::Termination for CodingResult {
    fn report(self) -> std::process::ExitCode {
        match self {
            CodingResult::Ok => std::process::ExitCode::SUCCESS,
            CodingResult::Err(err) => {
                eprintln!("{}", err);
                std::process::ExitCode::FAILURE
            }
            CodingResult::Panic => {
                eprintln!(
                    "The process failed irrecoverably! This should never happen and is a bug."
                );
                std::process::ExitCode::from(128)
            }
        }
    }
}
