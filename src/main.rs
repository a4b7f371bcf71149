use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "opl2midi")]
#[command(version = "0.1.0")]
#[command(about = "Convert OPL register captures (IMF, WLF, DRO, RAW) to MIDI", long_about = None)]
struct Args {
    /// Input capture (.imf, .wlf, .dro or .raw, optionally gzipped)
    input: PathBuf,

    /// Output MIDI file
    output: PathBuf,

    /// Disable use of MIDI pitch bends
    #[arg(short = 'p', long = "no-pitch-bends")]
    no_pitch_bends: bool,

    /// With pitch bends disabled, approximate by playing the nearest note
    #[arg(short = 'a', long = "approximate", requires = "no_pitch_bends")]
    approximate: bool,

    /// Don't convert OPL rhythm-mode instruments
    #[arg(short = 'r', long = "no-rhythm")]
    no_rhythm: bool,

    /// Only use instruments that match perfectly; others use the first mapping entry
    #[arg(short = 'i', long = "perfect-only")]
    perfect_only: bool,

    /// Instrument mapping file
    #[arg(short = 'm', long, default_value = "inst.txt")]
    mapping: PathBuf,

    /// General MIDI patch names
    #[arg(long, default_value = "patch.txt")]
    patch_names: PathBuf,

    /// General MIDI percussion note names
    #[arg(long, default_value = "drum.txt")]
    drum_names: PathBuf,

    /// Pitch bend sensitivity in semitones (1-24)
    #[arg(long, default_value_t = 24)]
    bend_range: u8,

    /// Nominal tempo written to the MIDI file
    #[arg(long, default_value_t = 120)]
    tempo: u16,

    /// Show per-event diagnostics
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), opl2midi::Error> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.input == args.output {
        return Err(opl2midi::Error::InvalidOptions(
            "input and output must be different files".into(),
        ));
    }

    let options = opl2midi::ConvertOptions {
        rhythm: !args.no_rhythm,
        pitch_bends: !args.no_pitch_bends,
        approximate_bends: args.approximate,
        perfect_matches_only: args.perfect_only,
        bend_range: args.bend_range,
        tempo_bpm: args.tempo,
    };
    options.validate()?;

    let catalog = opl2midi::InstrumentCatalog::load(&args.mapping, &args.patch_names, &args.drum_names)?;
    let known = catalog.len();

    let stats = opl2midi::convert_file(&args.input, &args.output, &options, catalog)?;
    if stats.learned_instruments > 0 {
        tracing::info!(
            "{} instruments were not in the mapping file ({} known)",
            stats.learned_instruments,
            known
        );
    }

    Ok(())
}
