use subhist::config::Config;
use subhist::host::HostEventParser;
use subhist::producer::{LastPosition, ProducerContext};
use subhist::snapshot::{Snapshot, SnapshotReader, SnapshotWriter};
use subhist::view::ViewState;
use subhist::watcher::{open_subscription, ChangeWatcher, WatchMode};
use subhist::SubtitleEntry;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{info, warn};

const RENDER_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    match run() {
        Ok(()) => (),
        Err(err) => {
            eprintln!("An error occurred: {}", err);
            for cause in err.chain().skip(1) {
                eprintln!("    {}", cause);
            }
        }
    }
}

#[derive(ClapParser)]
#[command(about = "Share a live subtitle history between a media player and a viewer")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "The config file to use. If not supplied, subhist.toml is used when present."
    )]
    config: Option<PathBuf>,
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "The subtitle snapshot file. Overrides the configured path."
    )]
    file: Option<PathBuf>,
    #[arg(short, long, help = "Enable debug logging.")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Capture subtitles from a stream of player events")]
    Feed {
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "The file to read events from. If not supplied, events are read from standard input.",
            default_value = "-"
        )]
        input: String,
        #[arg(long, help = "Maximum number of subtitles to keep.")]
        capacity: Option<usize>,
        #[arg(long, help = "Position jump, in seconds, treated as a seek.")]
        threshold: Option<f64>,
    },
    #[command(about = "Follow the snapshot file and print the latest subtitles")]
    Watch {
        #[arg(short = 'n', long, help = "Number of subtitles to show.")]
        count: Option<usize>,
        #[arg(long, help = "Poll the file instead of using native notifications.")]
        poll: bool,
    },
    #[command(about = "Print the current snapshot once")]
    Show {
        #[arg(short = 'n', long, help = "Number of subtitles to show.")]
        count: Option<usize>,
    },
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    subhist::logger::init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(file) = cli.file {
        config.path = file;
    }
    match &cli.command {
        Command::Feed {
            capacity,
            threshold,
            ..
        } => {
            if let Some(capacity) = capacity {
                config.producer.capacity = *capacity;
            }
            if let Some(threshold) = threshold {
                config.producer.seek_threshold = *threshold;
            }
        }
        Command::Watch { count, poll } => {
            if let Some(count) = count {
                config.consumer.display_count = *count;
            }
            if *poll {
                config.consumer.watch_mode = WatchMode::Poll;
            }
        }
        Command::Show { count } => {
            if let Some(count) = count {
                config.consumer.display_count = *count;
            }
        }
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Feed { input, .. } => feed(&config, &input),
        Command::Watch { .. } => watch(&config),
        Command::Show { .. } => show(&config),
    }
}

fn feed(config: &Config, input: &str) -> Result<()> {
    let filter = config
        .capture_filter()
        .context("Failed to load drop patterns")?;
    let events: Box<dyn BufRead> = if input == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(input).context(format!("Failed to open input file: '{}'", input))?;
        Box::new(BufReader::new(file))
    };

    let mut ctx = ProducerContext::start(
        config.producer_options(),
        SnapshotWriter::new(&config.path),
        filter,
    );
    let mut parser = HostEventParser::new();
    let mut clock = LastPosition::default();
    for line in events.lines() {
        let line = line.context("Failed to read player events")?;
        match parser.parse_line(&line) {
            Ok(Some(event)) => {
                clock.observe(&event);
                ctx.dispatch(event, &clock);
            }
            Ok(None) => (),
            Err(err) => warn!(error = %err, "skipping player event"),
        }
    }
    info!(entries = ctx.history().len(), "player event stream ended");
    Ok(())
}

fn watch(config: &Config) -> Result<()> {
    let view = Arc::new(ViewState::new(
        config.consumer.display_count,
        config.consumer.max_display_count,
    ));
    let subscription = open_subscription(
        config.consumer.watch_mode,
        &config.path,
        config.poll_interval(),
    )
    .context(format!("Failed to watch subtitle file: '{}'", config.path.display()))?;
    let handle = ChangeWatcher::spawn(
        SnapshotReader::new(&config.path),
        subscription,
        Arc::clone(&view),
        config.debounce(),
    );

    let term = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&term))
            .context("Failed to install signal handler")?;
    }

    let stdout = io::stdout();
    let mut shown: Option<(Arc<Vec<SubtitleEntry>>, bool, usize)> = None;
    while !term.load(Ordering::Relaxed) {
        let entries = view.read();
        let file_exists = config.path.exists();
        let count = view.display_count();
        let unchanged = shown.as_ref().map_or(false, |(prev, exists, n)| {
            Arc::ptr_eq(prev, &entries) && *exists == file_exists && *n == count
        });
        if !unchanged {
            let mut out = stdout.lock();
            writeln!(out, "--- subtitle history ---")?;
            render(&mut out, &view.visible(), file_exists)?;
            out.flush()?;
            shown = Some((entries, file_exists, count));
        }
        std::thread::sleep(RENDER_INTERVAL);
    }

    info!("shutting down");
    handle.shutdown();
    Ok(())
}

fn show(config: &Config) -> Result<()> {
    let reader = SnapshotReader::new(&config.path);
    let snapshot = reader
        .read()
        .context(format!("Failed to read subtitle file: '{}'", config.path.display()))?;
    let view = ViewState::new(
        config.consumer.display_count,
        config.consumer.max_display_count,
    );
    let file_exists = match snapshot {
        Snapshot::Entries(entries) => {
            view.replace(entries);
            true
        }
        Snapshot::Missing => false,
    };
    let mut out = io::stdout().lock();
    render(&mut out, &view.visible(), file_exists)?;
    out.flush()?;
    Ok(())
}

/// Oldest first, so the newest line ends up at the bottom of the terminal.
fn render<W: Write>(buf: &mut W, entries: &[SubtitleEntry], file_exists: bool) -> io::Result<()> {
    if entries.is_empty() {
        if file_exists {
            writeln!(buf, "No subtitles yet...")?;
        } else {
            writeln!(buf, "No subtitle data (maybe mpv isn't running?)")?;
        }
        return Ok(());
    }
    for entry in entries {
        writeln!(buf, "[{:.1}s] {}", entry.start_time, entry.text)?;
    }
    Ok(())
}
