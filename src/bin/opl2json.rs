//! OPL capture to JSON dumper

use clap::Parser;
use opl2midi::capture::{self, CaptureEvent, CaptureInfo};
use opl2midi::midi::{MidiEvent, MidiLog};
use opl2midi::{ConversionStats, ConvertOptions, Converter, InstrumentCatalog};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "opl2json")]
#[command(version = "0.1.0")]
#[command(about = "Dump OPL captures as JSON event timelines", long_about = None)]
struct Args {
    /// Input capture (.imf, .wlf, .dro or .raw, optionally gzipped)
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,

    /// Dump the converted MIDI events instead of the register writes
    #[arg(long)]
    midi: bool,

    /// Instrument mapping file used with --midi
    #[arg(short = 'm', long, default_value = "inst.txt")]
    mapping: PathBuf,
}

#[derive(Serialize)]
struct CaptureDump {
    info: CaptureInfo,
    events: Vec<CaptureEvent>,
}

#[derive(Serialize)]
struct MidiDump {
    info: CaptureInfo,
    stats: ConversionStats,
    events: Vec<MidiEvent>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let data = capture::read_capture_file(&args.input)?;
    let name = capture::capture_name(&args.input);
    let mut source = capture::open(&data, &name)?;
    let info = *source.info();

    let json_string = if args.midi {
        let catalog = InstrumentCatalog::load(
            &args.mapping,
            &args.mapping.with_file_name("patch.txt"),
            &args.mapping.with_file_name("drum.txt"),
        )?;
        let mut converter = Converter::new(ConvertOptions::default(), catalog)?;
        let mut log = MidiLog::new();
        let stats = converter.run(source.as_mut(), &mut log)?;
        let dump = MidiDump {
            info,
            stats,
            events: log.merged_advances(),
        };
        if args.compact {
            serde_json::to_string(&dump)?
        } else {
            serde_json::to_string_pretty(&dump)?
        }
    } else {
        let dump = CaptureDump {
            info,
            events: capture::collect_events(source.as_mut()),
        };
        if args.compact {
            serde_json::to_string(&dump)?
        } else {
            serde_json::to_string_pretty(&dump)?
        }
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json_string.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", json_string);
        }
    }

    Ok(())
}
