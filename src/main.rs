//! `scenery` command line: open a preview window, or run a scene headless.

use std::path::Path;
use std::process::ExitCode;

use scenery::engine::{FrameOutcome, SceneLifecycleManager};
use scenery::events::EventSource;
use scenery::host::HeadlessHost;
use scenery::loader::ThreadedModelLoader;
use scenery::viewer::Viewer;
use scenery::{SceneConfig, SceneryError};

const USAGE: &str = "usage: scenery [PRESET.toml | PRESET-NAME] [--headless FRAMES]";

struct Args {
    preset: Option<String>,
    headless_frames: Option<u64>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        preset: None,
        headless_frames: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--headless" => {
                let frames = iter
                    .next()
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| "--headless needs a frame count".to_owned())?;
                args.headless_frames = Some(frames);
            }
            "-h" | "--help" => return Err(USAGE.to_owned()),
            _ if args.preset.is_none() => args.preset = Some(arg),
            _ => return Err(format!("unexpected argument '{arg}'")),
        }
    }
    Ok(args)
}

/// A path to a TOML file, or the name of a shipped preset.
fn load_config(preset: Option<&str>) -> Result<SceneConfig, SceneryError> {
    let Some(preset) = preset else {
        return Ok(SceneConfig::default());
    };
    let path = Path::new(preset);
    if path.extension().is_some_and(|ext| ext == "toml") {
        return SceneConfig::load(path);
    }
    SceneConfig::load(&Path::new("assets/presets").join(format!("{preset}.toml")))
}

/// Attach, run `frames` frames, detach, and report what leaked.
fn run_headless(config: &SceneConfig, frames: u64) -> Result<(), SceneryError> {
    let host = HeadlessHost::new(1280, 720);
    let ledger = host.ledger();
    let mut manager = SceneLifecycleManager::new(EventSource::new())
        .with_model_loader(ThreadedModelLoader::from_dir(Path::new("assets")));

    let handle = manager.attach(host.clone(), config)?;
    let mut drawn = 0;
    for _ in 0..frames {
        for (_, ticket) in host.take_frame_requests() {
            if manager.frame(handle, ticket) == FrameOutcome::Drawn {
                drawn += 1;
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(16));
    }
    if let Some(stats) = manager.stats(handle) {
        log::info!(
            "{drawn} frames drawn, {} live buffers, model {:?}",
            stats.live_buffers,
            stats.model
        );
    }
    let _ = manager.detach(handle);

    let ledger = ledger.borrow();
    log::info!(
        "after detach: {} surfaces, {} live buffers, {}/{} devices released",
        host.surface_count(),
        ledger.live_buffers(),
        ledger.devices_released(),
        ledger.devices_created()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            log::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let config = match load_config(args.preset.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.headless_frames {
        Some(frames) => run_headless(&config, frames),
        None => Viewer::builder().with_config(config).build().run(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
