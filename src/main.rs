//! kmsvideo - KMS display resource manager
//!
//! Brings up the primary display at the configured resolution, paints a
//! test pattern into the scanout buffer and follows hotplug events until
//! signalled.

use anyhow::{anyhow, Context as _, Result};
use log::{info, warn};
use std::time::Duration;

use kmsvideo::config::{DeviceCapability, PatternKind, Settings};
use kmsvideo::constants::{msgid, HOTPLUG_POLL_INTERVAL_MS};
use kmsvideo::drm::{fill_pattern, Size};
use kmsvideo::utils::{setup_signal_handlers, shutdown_requested};

#[cfg(target_os = "linux")]
use kmsvideo::drm::{list_device_nodes, Card, Device};
#[cfg(target_os = "linux")]
use kmsvideo::Context;

fn print_help() {
    println!(
        r#"kmsvideo {} - KMS display resource manager

USAGE:
    kmsvideo [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -l, --list              List display devices, connectors and modes
    --mode WxH[@Hz]         Set the display resolution after startup
    --pattern KIND          Test pattern: tiles, plain or none
    --once                  Exit after setting up the display

EXAMPLES:
    kmsvideo --list                   Show what the kernel reports
    kmsvideo --mode 1280x720@60       Run at 720p
    sudo kmsvideo --pattern plain     Run with root privileges (required for DRM)

CONFIG FILES:
    ~/.config/kmsvideo/config.toml
    /etc/kmsvideo/device-cap.json
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Parse "WxH" or "WxH@Hz"
fn parse_mode(arg: &str) -> Result<(Size, u32)> {
    let (size, refresh) = match arg.split_once('@') {
        Some((size, hz)) => (size, hz.parse().with_context(|| format!("bad refresh rate: {}", hz))?),
        None => (arg, 0),
    };
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("expected WxH, got {}", size))?;
    let size = Size::new(
        w.parse().with_context(|| format!("bad width: {}", w))?,
        h.parse().with_context(|| format!("bad height: {}", h))?,
    );
    Ok((size, refresh))
}

/// Value following `flag` on the command line
fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    args.get(pos + 1)
        .map(|v| Some(v.as_str()))
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

/// Print every device node with its connectors and modes
#[cfg(target_os = "linux")]
fn list_devices(settings: &Settings) -> Result<()> {
    let nodes = list_device_nodes()?;
    if nodes.is_empty() {
        println!("No display devices found");
        return Ok(());
    }

    for node in nodes.iter().filter(|n| settings.display.matches_node(n)) {
        let card = match Card::open(node) {
            Ok(card) => card,
            Err(e) => {
                println!("{}: {:#}", node, e);
                continue;
            }
        };
        let device = Device::load(node, card, Size::default(), settings.display.fourcc())?;
        println!(
            "{}: {} connectors, {} CRTCs, {} planes",
            node,
            device.connectors().len(),
            device.crtcs().len(),
            device.planes().len()
        );
        for connector in device.connectors() {
            let vendor = connector
                .edid()
                .and_then(|edid| edid.manufacturer())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {}-{} ({:?}, EDID {})",
                connector.name,
                connector.id,
                connector.info().state,
                vendor
            );
            for mode in connector.modes() {
                println!(
                    "    {}@{}{}",
                    mode.name,
                    mode.vrefresh,
                    if mode.preferred { " *" } else { "" }
                );
            }
        }
    }
    Ok(())
}

/// Paint the scanout buffer of the primary display
#[cfg(target_os = "linux")]
fn paint_pattern(ctx: &mut Context, kind: PatternKind) -> Result<()> {
    let color = ctx.settings().pattern.rgb();
    let device = ctx
        .video_mut()
        .devices_mut()
        .primary_mut()
        .ok_or_else(|| anyhow!("no primary display device"))?;

    let crtc = device
        .display_crtc()
        .ok_or_else(|| anyhow!("primary display has no CRTC"))?;
    let crtc_id = crtc.id;
    let bo = crtc
        .scanout_buffer()
        .ok_or_else(|| anyhow!("CRTC {} has no scanout buffer", crtc_id))?;
    let (format, width, height, pitch) = (bo.format(), bo.width(), bo.height(), bo.pitch());

    let buf = device.map_scanout(crtc_id)?;
    fill_pattern(buf, format, width, height, pitch, kind, color)?;
    info!("{:?} pattern drawn on CRTC {}", kind, crtc_id);
    Ok(())
}

#[cfg(target_os = "linux")]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("kmsvideo {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = Settings::load();

    if args.iter().any(|a| a == "--list" || a == "-l") {
        return list_devices(&settings);
    }

    let mode = flag_value(&args, "--mode")?.map(parse_mode).transpose()?;
    let pattern = match flag_value(&args, "--pattern")? {
        Some(kind) => kind.parse::<PatternKind>()?,
        None => settings.pattern.kind,
    };
    let once = args.iter().any(|a| a == "--once");

    info!("kmsvideo starting...");
    setup_signal_handlers();

    let capability = DeviceCapability::load(&DeviceCapability::default_path());
    let mut ctx = Context::new(settings, capability)?;

    ctx.video_mut()
        .set_observer(Box::new(|min: Size, max: Size| {
            info!(target: msgid::DEVICE_STATUS, "Display now supports {} - {}", min, max);
        }));

    if let Some((size, refresh)) = mode {
        ctx.video_mut()
            .set_display_mode(size, refresh)
            .with_context(|| format!("Failed to set mode {}@{}", size, refresh))?;
    }

    if let Err(e) = paint_pattern(&mut ctx, pattern) {
        warn!("Test pattern skipped: {:#}", e);
    }

    let resolution = ctx.video().display_resolution();
    info!("Display running at {}x{}", resolution.w, resolution.h);

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    if once {
        let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
        return Ok(());
    }

    let mut last_resolution = resolution;
    while !shutdown_requested() {
        if ctx.poll_hotplug() {
            // Hotplug may have re-created the scanout at a new size
            let resolution = ctx.video().display_resolution();
            if resolution != last_resolution {
                last_resolution = resolution;
                if let Err(e) = paint_pattern(&mut ctx, pattern) {
                    warn!("Test pattern skipped: {:#}", e);
                }
            }
            continue;
        }
        std::thread::sleep(Duration::from_millis(HOTPLUG_POLL_INTERVAL_MS));
    }

    info!("Shutdown requested, exiting");
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() -> Result<()> {
    Err(anyhow!("kmsvideo requires Linux DRM/KMS"))
}
