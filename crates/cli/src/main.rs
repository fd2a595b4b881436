use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use rtsp::{CaptureProducer, DirectoryCaptureSource, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "mjpg-streamer", about = "Standalone MJPEG/RTSP streaming server")]
struct Args {
    /// RTSP/HTTP bind port.
    #[arg(long, default_value_t = 8554)]
    port: u16,

    /// Capture source directory, cycled as a sequence of JPEG frames.
    #[arg(long)]
    input: PathBuf,

    /// Offer TCP-interleaved transport by default in SETUP negotiation.
    /// Advisory only — the RTSP layer honors whatever transport the
    /// client actually requests.
    #[arg(long, conflicts_with = "udp")]
    tcp: bool,

    /// Offer UDP unicast transport by default (default behavior).
    #[arg(long, conflicts_with = "tcp")]
    udp: bool,

    /// Nominal capture frame rate.
    #[arg(long, default_value_t = 15.0)]
    fps: f64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let bind_addr = format!("0.0.0.0:{}", args.port);
    let default_transport = if args.tcp { "tcp" } else { "udp" };

    let config = ServerConfig {
        fps_hint: args.fps,
        ..ServerConfig::default()
    };

    let mut server = Server::with_config(&bind_addr, config);

    if let Err(e) = server.start() {
        eprintln!("failed to start server on {bind_addr}: {e}");
        return ExitCode::FAILURE;
    }

    let source = match DirectoryCaptureSource::open(&args.input, args.fps) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("failed to open capture source {}: {e}", args.input.display());
            server.stop();
            return ExitCode::FAILURE;
        }
    };

    let running = server.shutdown_flag();
    let capture_thread = {
        let producer = CaptureProducer::new(source, server.frame_slot(), running.clone());
        std::thread::spawn(move || producer.run())
    };

    {
        let running = running.clone();
        let slot = server.frame_slot();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            slot.shutdown();
        }) {
            tracing::warn!(error = %e, "failed to install signal handler");
        }
    }

    tracing::info!(
        bind = %bind_addr,
        input = %args.input.display(),
        default_transport,
        "mjpg-streamer running, Ctrl-C to stop"
    );

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    server.stop();
    let _ = capture_thread.join();

    ExitCode::SUCCESS
}
