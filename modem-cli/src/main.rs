use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use modem_core::framer;
use modem_core::ldpc::Variant;
use modem_core::{modulator, Config};

#[derive(Parser, Debug)]
#[command(author, version, about = "DSSS-DPSK acoustic data modem", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults to the modem's built-in config.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Modulate a file of bytes into a WAV of the transmitted signal.
    Modulate {
        /// Input file to encode.
        input: PathBuf,
        /// Output WAV path.
        output: PathBuf,
    },
    /// Demodulate a WAV recording back into the original bytes.
    Demodulate {
        /// Input WAV path.
        input: PathBuf,
        /// Output file for the recovered bytes.
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let cfg = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config from {}", path.display()))?;
            toml::from_str(&text).wrap_err("parsing config TOML")?
        }
        None => Config::default(),
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Smallest LDPC variant whose payload capacity holds `len` bytes, so a
/// short chunk doesn't get padded out to a larger frame than it needs.
fn smallest_variant_for(len: usize) -> Variant {
    [Variant::N16, Variant::N32, Variant::N64, Variant::N128]
        .into_iter()
        .find(|v| v.k() / 8 >= len)
        .unwrap_or(Variant::N128)
}

fn modulate(input: &PathBuf, output: &PathBuf, cfg: &Config) -> Result<()> {
    let bytes = fs::read(input).wrap_err_with(|| format!("reading {}", input.display()))?;
    let chunk_bytes = (Variant::N128.k() / 8).max(1);

    let mut samples = Vec::new();
    for (seq, chunk) in bytes.chunks(chunk_bytes).enumerate() {
        let variant = smallest_variant_for(chunk.len());
        let bits = framer::build(chunk, (seq % 256) as u8, 0, variant)
            .wrap_err("assembling frame")?;
        samples.extend(modulator::modulate(&bits, cfg).wrap_err("modulating frame")?);
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: cfg.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .wrap_err_with(|| format!("creating {}", output.display()))?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn demodulate(input: &PathBuf, output: &PathBuf, cfg: Config) -> Result<()> {
    let mut reader =
        hound::WavReader::open(input).wrap_err_with(|| format!("opening {}", input.display()))?;
    let samples: Vec<f32> = match reader.spec().sample_format {
        hound::SampleFormat::Float => {
            reader.samples::<f32>().collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<Result<_, _>>()?,
    };

    let mut demod = modem_core::Demodulator::new(cfg)?;
    demod.add_samples(&samples);

    // `poll_frames` only drives the state machine through a bounded number
    // of steps per call, so draining a whole recording takes several
    // calls. Keep polling until the sync position stops advancing, which
    // is exactly when the buffered samples are exhausted.
    let mut payload = Vec::new();
    let mut last_offset = demod.sync_state().sample_offset;
    loop {
        for frame in demod.poll_frames() {
            payload.extend(frame.payload);
        }
        let offset = demod.sync_state().sample_offset;
        if offset == last_offset {
            break;
        }
        last_offset = offset;
    }
    fs::write(output, &payload).wrap_err_with(|| format!("writing {}", output.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    let cfg = load_config(args.config.as_ref())?;

    match args.command {
        Command::Modulate { input, output } => modulate(&input, &output, &cfg),
        Command::Demodulate { input, output } => demodulate(&input, &output, cfg),
    }
}
