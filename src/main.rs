use anyhow::Context;
use clap::{Parser, Subcommand};
use lacquer::{
    allocator::{BufferAllocator, DmaHeapAllocator},
    dataspace::Dataspace,
    factory,
    format::PixelFormat,
    geometry::Coord,
    CanvasAttr, Capability, Color, Compositor, Config, Plane,
};
use std::os::fd::AsRawFd;

#[derive(Parser, Debug)]
#[command(name = "lacquer")]
#[command(about = "inspect and exercise exynos 2d engines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every known hardware spec with its limits
    List,
    /// Open an engine and cancel its performance request
    Probe { spec: String },
    /// Fill a new target buffer with one color
    Fill {
        spec: String,
        /// WIDTHxHEIGHT
        #[arg(value_parser = parse_size)]
        size: Coord,
        /// RRGGBBAA
        #[arg(value_parser = parse_color)]
        color: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let _guard = setup_tracing();
    let cli = Cli::parse();
    let config = Config::setup()?;

    match cli.command {
        Command::List => list(),
        Command::Probe { spec } => probe(&spec, &config)?,
        Command::Fill { spec, size, color } => fill(&spec, size, color, &config)?,
    }
    Ok(())
}

fn list() {
    for spec in &factory::SPECS {
        let cap = spec.capability;
        println!(
            "{:<18} {:?}: {} layers, src {}..{}, dst {}..{}, up x{}, down 1/{}",
            spec.id,
            spec.kind,
            cap.max_layers,
            cap.min_src_dimension,
            cap.max_src_dimension,
            cap.min_dst_dimension,
            cap.max_dst_dimension,
            cap.max_upsampling.hori,
            cap.max_downsampling.hori,
        );
    }
}

fn probe(spec: &str, config: &Config) -> anyhow::Result<()> {
    let mut engine = factory::try_create(spec, config).with_context(|| format!("failed to open {spec}"))?;
    engine.request_performance_qos(None).context("failed to cancel performance request")?;
    println!("{spec}: {} engine, {} formats", engine.name(), engine.capability().formats.len());
    Ok(())
}

fn fill(spec: &str, size: Coord, color: u32, config: &Config) -> anyhow::Result<()> {
    let mut engine = factory::try_create(spec, config).with_context(|| format!("failed to open {spec}"))?;

    check_target_size(engine.capability(), size)?;

    let format = PixelFormat::Rgba8888;
    let len = format.plane_length(0, size.hori, size.vert);
    let allocator = DmaHeapAllocator::new(&config.dma_heap, &config.secure_dma_heap);
    let buffer = allocator.allocate(len, false).context("failed to allocate target")?;

    let canvas = engine.canvas_mut();
    canvas.set_dimension(size.hori, size.vert);
    canvas.set_image_type(format, Dataspace::LEGACY_SRGB);
    canvas.set_buffer(&[Plane::dmabuf(buffer.as_raw_fd(), 0, len)], None, CanvasAttr::empty())?;
    engine.set_background_color(Some(Color::from_rgba8888(color)));

    engine.execute_blocking().context("fill failed")?;
    println!("filled {size} with {color:08x} on {}", engine.name());
    Ok(())
}

fn check_target_size(cap: &Capability, size: Coord) -> anyhow::Result<()> {
    anyhow::ensure!(
        cap.supports_dst_dimension(size),
        "target {size} is outside {}..{}",
        cap.min_dst_dimension,
        cap.max_dst_dimension
    );
    Ok(())
}

fn parse_size(arg: &str) -> Result<Coord, String> {
    let (width, height) = arg.split_once('x').ok_or("expected WIDTHxHEIGHT")?;
    let parse = |value: &str| value.parse::<u32>().map_err(|err| format!("{value:?}: {err}"));
    Ok(Coord::new(parse(width)?, parse(height)?))
}

fn parse_color(arg: &str) -> Result<u32, String> {
    u32::from_str_radix(arg.trim_start_matches('#'), 16).map_err(|err| format!("{arg:?}: {err}"))
}

fn setup_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_appender::{non_blocking, rolling::never};
    std::fs::remove_file(".log").ok();
    let (log, guard) = non_blocking(never(".", ".log"));
    tracing_subscriber::fmt()
        .with_writer(log)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_size_is_checked_before_allocation() {
        let cap = factory::lookup("mscl_9810").unwrap().capability;
        let size = parse_size("70000x70000").unwrap();
        assert!(check_target_size(cap, size).is_err());
        assert!(check_target_size(cap, parse_size("1920x1080").unwrap()).is_ok());
        assert!(parse_size("1920").is_err());
    }
}
