mod capture;
mod classify;
mod config;
mod frame;
mod payload;
mod reduce;
mod session;

use anyhow::{bail, Context, Result};
use capture::{CaptureSource, WebcamCapture};
use clap::Parser;
use classify::ClassificationClient;
use config::ClassifierConfig;
use session::{DisplayState, Session, SessionError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Estimate age from a webcam frame or image file", long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    device: u32,

    /// Classify this image file instead of a camera frame
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Inference endpoint (overrides AGECAM_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// API token (overrides AGECAM_API_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Classification timeout in seconds (overrides AGECAM_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Read commands from stdin instead of running a single cycle
    #[arg(long)]
    interactive: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let config = load_config(&args)?;
    tracing::info!("agecam starting");
    tracing::debug!("{:?}", config);

    let client = ClassificationClient::new(config).context("Failed to build HTTP client")?;
    let mut session = Session::new(client);

    // The camera is only needed when no file was given up front
    let mut camera = if args.interactive || args.image.is_none() {
        capture::acquire(args.device)
    } else {
        None
    };

    let outcome = if args.interactive {
        run_interactive(&mut session, &mut camera, args.image.as_deref()).await
    } else {
        run_once(&mut session, &mut camera, args.image.as_deref()).await
    };

    if let Some(camera) = camera.as_mut() {
        camera.release();
    }

    outcome
}

fn load_config(args: &Args) -> Result<ClassifierConfig> {
    let mut config = ClassifierConfig::from_env()?;

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(token) = &args.token {
        config.api_token = token.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

fn source(camera: &mut Option<WebcamCapture>) -> Option<&mut dyn CaptureSource> {
    camera.as_mut().map(|c| c as &mut dyn CaptureSource)
}

async fn run_once(
    session: &mut Session,
    camera: &mut Option<WebcamCapture>,
    image: Option<&std::path::Path>,
) -> Result<()> {
    match image {
        Some(path) => session.stage(frame::capture_from_file(path)?),
        None => {
            if !session.capture(source(camera))? {
                bail!("No camera available; pass --image to classify a file");
            }
        }
    }

    session.upload()?;
    tracing::info!("Waiting for classification");

    match session.settle().await {
        DisplayState::Result(age) => {
            println!("{}", DisplayState::Result(age));
            Ok(())
        }
        DisplayState::Error(reason) => bail!(reason),
        other => bail!("Classification ended in unexpected state: {}", other),
    }
}

/// Run the upload button: only enabled with a staged image and nothing in flight
fn upload_command(session: &mut Session) -> String {
    if !session.can_upload() {
        return if session.staged().is_none() {
            SessionError::NothingStaged.to_string()
        } else {
            "Upload disabled while a request is in flight".to_string()
        };
    }

    match session.upload() {
        Ok(cycle) => format!("Uploading (cycle {})", cycle),
        Err(err) => err.to_string(),
    }
}

async fn run_interactive(
    session: &mut Session,
    camera: &mut Option<WebcamCapture>,
    image: Option<&std::path::Path>,
) -> Result<()> {
    let mut display = session.subscribe();
    let printer = tokio::spawn(async move {
        while display.changed().await.is_ok() {
            let state = display.borrow_and_update().clone();
            println!("{}", state);
        }
    });

    if let Some(path) = image {
        session.stage(frame::capture_from_file(path)?);
        println!("Staged {}", path.display());
    }

    println!("Commands: capture (c), file <path>, upload (u), status, quit (q)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "" => {}
            "c" | "capture" => match session.capture(source(camera)) {
                Ok(true) => println!("Captured frame"),
                Ok(false) => println!("No camera available; use `file <path>`"),
                Err(err) => println!("Capture failed: {:#}", err),
            },
            "file" => match frame::capture_from_file(rest.trim()) {
                Ok(image) => {
                    session.stage(image);
                    println!("Staged {}", rest.trim());
                }
                Err(err) => println!("{:#}", err),
            },
            "u" | "upload" => println!("{}", upload_command(session)),
            "status" => {
                match session.staged() {
                    Some(image) => println!("Staged: {} bytes from {:?}", image.len(), image.origin()),
                    None => println!("Staged: nothing"),
                }
                println!("{}", session.state());
            }
            "q" | "quit" => break,
            other => println!("Unknown command: {}", other),
        }
    }

    session.settle().await;
    tokio::task::yield_now().await;
    printer.abort();

    Ok(())
}
