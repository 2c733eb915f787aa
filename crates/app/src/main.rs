use std::{
    io::{self, BufRead},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread,
};

use clap::{Parser, Subcommand};
use mouse_recorder_core::{
    format, AppConfig, InputInjector, LoggingInjector, LoopProgress, PlaybackListener,
    PlaybackOutcome, Player, Record, RecorderError, Result,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("mouse-recorder.json"));
    let config = AppConfig::load(&config_path)?;

    match cli.command {
        Commands::Record { output, seconds } => run_record(&output, seconds),
        Commands::Play {
            input,
            speed,
            loops,
            infinite,
            dry_run,
        } => {
            let config = apply_overrides(config, speed, loops, infinite.then_some(true))?;
            run_play(&input, &config, dry_run)
        }
        Commands::Inspect { input } => run_inspect(&input),
        Commands::Convert { input, output } => {
            let record = format::load_from_path(&input)?;
            format::save_to_path(&record, &output)
        }
        Commands::Config {
            speed,
            loops,
            infinite,
            write,
        } => {
            let config = apply_overrides(config, speed, loops, infinite)?;
            println!("{}", config.to_json_pretty()?);
            if write {
                config.save(&config_path)?;
                tracing::info!(path = ?config_path, "configuration written");
            }
            Ok(())
        }
    }
}

fn apply_overrides(
    mut config: AppConfig,
    speed: Option<f64>,
    loops: Option<u32>,
    infinite: Option<bool>,
) -> Result<AppConfig> {
    if let Some(speed) = speed {
        config.speed = speed;
    }
    if let Some(loops) = loops {
        config.loop_count = loops;
        config.infinite_loop = false;
    }
    if let Some(infinite) = infinite {
        config.infinite_loop = infinite;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "native")]
fn run_record(output: &Path, seconds: Option<u64>) -> Result<()> {
    use std::time::Duration;

    use mouse_recorder_core::{RdevHook, Recorder};

    let mut recorder = Recorder::new(RdevHook::new());
    recorder.record()?;
    match seconds {
        Some(seconds) => println!("Recording for {seconds}s (press Enter to stop early)..."),
        None => println!("Recording... press Enter to stop."),
    }

    let enter = enter_pressed();
    let _ = match seconds {
        Some(seconds) => enter.recv_timeout(Duration::from_secs(seconds)).ok(),
        None => enter.recv().ok(),
    };

    let record = recorder.stop()?;
    format::save_to_path(&record, output)?;
    println!("Captured {} events into {}", record.len(), output.display());
    Ok(())
}

#[cfg(not(feature = "native"))]
fn run_record(output: &Path, seconds: Option<u64>) -> Result<()> {
    tracing::debug!(?output, ?seconds, "record requested without native input support");
    Err(RecorderError::Platform(
        "this build has no global input hook; rebuild with `--features native`".into(),
    ))
}

fn run_play(input: &Path, config: &AppConfig, dry_run: bool) -> Result<()> {
    let record = Arc::new(format::load_from_path(input)?);
    tracing::info!(?input, events = record.len(), "starting playback");

    if dry_run {
        return play_with(LoggingInjector::new(), record, config);
    }
    play_native(record, config)
}

#[cfg(feature = "native")]
fn play_native(record: Arc<Record>, config: &AppConfig) -> Result<()> {
    play_with(mouse_recorder_core::EnigoInjector::new(), record, config)
}

#[cfg(not(feature = "native"))]
fn play_native(record: Arc<Record>, config: &AppConfig) -> Result<()> {
    tracing::warn!("no native injector in this build, falling back to dry run");
    play_with(LoggingInjector::new(), record, config)
}

fn play_with<I: InputInjector + 'static>(
    injector: I,
    record: Arc<Record>,
    config: &AppConfig,
) -> Result<()> {
    let mut player = Player::new(injector);
    player.add_listener(Arc::new(StatusLine));
    player.play(record, config)?;

    if let Some(stopper) = player.stop_handle() {
        let enter = enter_pressed();
        thread::spawn(move || {
            if enter.recv().is_ok() {
                stopper.stop();
            }
        });
    }
    println!("Playing... press Enter to stop.");

    match player.wait()? {
        PlaybackOutcome::Failed(reason) => Err(RecorderError::Platform(reason)),
        _ => Ok(()),
    }
}

fn run_inspect(input: &Path) -> Result<()> {
    let record = format::load_from_path(input)?;
    let summary = record.summary();
    println!("file:       {}", input.display());
    println!("created:    {} (unix ms)", summary.created_at_millis);
    println!("duration:   {} ms", summary.duration_millis);
    println!("events:     {}", summary.total_events());
    println!("  moves:    {}", summary.moves);
    println!("  presses:  {}", summary.presses);
    println!("  releases: {}", summary.releases);
    println!("  wheels:   {}", summary.wheels);
    Ok(())
}

/// Prints the loop status line the way the desktop front end shows it.
struct StatusLine;

impl PlaybackListener for StatusLine {
    fn loop_started(&self, progress: &LoopProgress) {
        println!("{progress}");
    }

    fn playback_finished(&self, outcome: &PlaybackOutcome) {
        match outcome {
            PlaybackOutcome::Completed { loops } => println!("Finished after {loops} loop(s)"),
            PlaybackOutcome::Cancelled { loops_started } => {
                println!("Stopped during loop {loops_started}")
            }
            PlaybackOutcome::Failed(reason) => println!("Playback failed: {reason}"),
        }
    }
}

/// Fires once when a line is read from stdin.
fn enter_pressed() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_ok() {
            let _ = tx.send(());
        }
    });
    rx
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Record and replay mouse input", long_about = None)]
struct Cli {
    /// JSON configuration file (speed, loops, minimize flags).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture global pointer input until Enter is pressed.
    Record {
        /// Destination file; `.json` selects the JSON export, anything else the binary format.
        #[arg(short, long)]
        output: PathBuf,
        /// Stop automatically after this many seconds.
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Replay a recorded file.
    Play {
        input: PathBuf,
        /// Playback speed multiplier (1.0 = real time).
        #[arg(short, long)]
        speed: Option<f64>,
        /// Number of times to repeat the recording.
        #[arg(short, long, conflicts_with = "infinite")]
        loops: Option<u32>,
        /// Repeat until stopped.
        #[arg(long)]
        infinite: bool,
        /// Log the events instead of injecting them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a summary of a recorded file.
    Inspect { input: PathBuf },
    /// Re-encode a recording; the codec follows each file's extension.
    Convert { input: PathBuf, output: PathBuf },
    /// Show the effective configuration, optionally persisting overrides.
    Config {
        #[arg(short, long)]
        speed: Option<f64>,
        #[arg(short, long)]
        loops: Option<u32>,
        #[arg(long)]
        infinite: Option<bool>,
        /// Write the resulting configuration back to the config file.
        #[arg(long)]
        write: bool,
    },
}
