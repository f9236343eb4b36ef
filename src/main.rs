use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use cdp_lib::audio::SpectrumAnalyzer;
use cdp_lib::config::{self, Config};
use cdp_lib::disc::{create_monitor, MonitorLoop, PresenceEvent};
use cdp_lib::display::{self, NUM_BANDS};
use cdp_lib::engine::{PlaybackController, SharedPlayback};
use cdp_lib::logging;
use cdp_lib::metadata::{self, DiscMetadata, MetadataSource, NoMetadata};

const RENDER_INTERVAL: Duration = Duration::from_millis(50);

fn load_config() -> Config {
    let path = std::env::args_os().nth(1).map(PathBuf::from).or_else(config::config_path);
    let Some(path) = path else {
        log::warn!("No config directory available, using defaults");
        return Config::default();
    };

    match config::load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    log::info!("cdp {} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    let shared = SharedPlayback::new();
    let controller = Arc::new(PlaybackController::new(config.clone(), Arc::clone(&shared)));

    if config.eject_on_start {
        controller.eject();
    }

    let mut analyzer = SpectrumAnalyzer::spawn(config.analyzer.clone(), Arc::clone(&shared));

    let (tx, mut rx) = mpsc::unbounded_channel::<PresenceEvent>();
    let mut monitor = MonitorLoop::spawn(
        create_monitor(&config.monitor),
        config.monitor.poll_interval(),
        Box::new(move |event| {
            let _ = tx.send(event);
        }),
    );

    let source: Arc<dyn MetadataSource> = Arc::new(NoMetadata);
    let now_playing: Arc<Mutex<Option<DiscMetadata>>> = Arc::new(Mutex::new(None));

    let mut render = tokio::time::interval(RENDER_INTERVAL);
    render.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                log::info!("Disc {}: {}", event.kind(), event.path().display());
                match event {
                    PresenceEvent::Mounted(path) => {
                        let controller = Arc::clone(&controller);
                        let source = Arc::clone(&source);
                        let now_playing = Arc::clone(&now_playing);
                        let delay = config.monitor.mount_delay();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let result = tokio::task::spawn_blocking(move || {
                                let title = path
                                    .file_name()
                                    .map(|n| n.to_string_lossy().into_owned())
                                    .unwrap_or_default();
                                let meta = source.fetch(None, &title);
                                log::info!("{}", metadata::now_playing_label(meta.as_ref(), 1));
                                *now_playing.lock() = meta;
                                controller.play_disc(&path, 1)
                            })
                            .await;
                            match result {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => log::error!("Playback failed: {}", e),
                                Err(e) => log::error!("Playback task failed: {}", e),
                            }
                        });
                    }
                    PresenceEvent::Unmounted(path) => {
                        if controller.current_mount().as_deref() == Some(path.as_path()) {
                            // stop() waits out any launch in progress; keep the loop rendering
                            let controller = Arc::clone(&controller);
                            let now_playing = Arc::clone(&now_playing);
                            tokio::task::spawn_blocking(move || {
                                controller.stop();
                                *now_playing.lock() = None;
                            });
                        }
                    }
                }
            }
            _ = render.tick(), if config.render_bars => {
                let bands = display::group_bands(&analyzer.get_spectrum(), NUM_BANDS);
                let label = if controller.is_playing() {
                    metadata::now_playing_label(now_playing.lock().as_ref(), controller.current_track_index())
                } else {
                    String::new()
                };
                let mut stdout = std::io::stdout().lock();
                let _ = write!(stdout, "\r{} {:<48}", display::bar_line(&bands), label);
                let _ = stdout.flush();
            }
            _ = &mut ctrl_c => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    if config.render_bars {
        println!();
    }

    monitor.stop();
    // The engine must be gone before exiting, so this one is awaited
    let stopper = Arc::clone(&controller);
    let _ = tokio::task::spawn_blocking(move || stopper.stop()).await;
    analyzer.stop();
    match logging::log_file_size() {
        Ok(size) => log::info!("cdp stopped ({} bytes logged to {})", size, logging::log_file_path().display()),
        Err(e) => log::info!("cdp stopped ({})", e),
    }
}
